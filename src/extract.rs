//! 页面解析：从论坛 HTML 中提取帖子、用户积分与登录状态
//!
//! 纯函数，输入 HTML 字符串，不依赖浏览器。

use scraper::{ElementRef, Html, Node, Selector};

use crate::browser::Post;
use crate::core::WorkerError;

/// 列表中广告区结束处的注释标记
pub const AD_MARKER: &str = "广告连接";

/// 积分区域中需要的字段（按展示顺序）
pub const USER_INFO_KEYS: [&str; 4] = ["威望", "金币", "貢獻值", "邀請幣"];

fn selector(css: &str) -> Result<Selector, WorkerError> {
    Selector::parse(css).map_err(|e| WorkerError::Extract(format!("bad selector {css}: {e:?}")))
}

/// 找到「广告连接」注释之后的第一个正常帖子
pub fn first_post_after_marker(html: &str) -> Result<Post, WorkerError> {
    let doc = Html::parse_document(html);
    let tbody_sel = selector("table#ajaxtable tbody")?;
    let row_sel = selector("tr.tr3.t_one")?;
    let link_sel = selector("a.subject")?;

    let tbody = doc
        .select(&tbody_sel)
        .nth(1)
        .ok_or_else(|| WorkerError::Extract("未找到第二个 tbody".into()))?;

    let mut target: Option<ElementRef> = None;
    for child in tbody.children() {
        let is_marker = matches!(child.value(), Node::Comment(c) if c.comment.contains(AD_MARKER));
        if !is_marker {
            continue;
        }
        // 注释之后紧邻的元素兄弟
        let next = child.next_siblings().find_map(ElementRef::wrap);
        if let Some(row) = next.filter(|el| row_sel.matches(el)) {
            target = Some(row);
            break;
        }
    }
    let row = target.ok_or_else(|| WorkerError::Extract("未找到广告连接后的帖子".into()))?;

    let link = row
        .select(&link_sel)
        .next()
        .ok_or_else(|| WorkerError::Extract("未找到帖子的链接元素".into()))?;
    let title = link.text().collect::<String>().trim().to_string();
    let href = link
        .value()
        .attr("href")
        .ok_or_else(|| WorkerError::Extract("帖子链接中没有 href 属性".into()))?
        .to_string();

    Ok(Post { title, href })
}

/// 解析用户积分表，输出通知中的积分块
pub fn user_info_summary(html: &str) -> Result<String, WorkerError> {
    let doc = Html::parse_fragment(html);
    let row_sel = selector("table.pwB_uTable_a tr")?;
    let td_sel = selector("td")?;
    let th_sel = selector("th")?;

    let mut found: Vec<(String, String)> = Vec::new();
    for row in doc.select(&row_sel) {
        let key = row
            .select(&td_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        if !USER_INFO_KEYS.contains(&key.as_str()) || found.iter().any(|(k, _)| *k == key) {
            continue;
        }
        let value = row
            .select(&th_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        found.push((key, value));
    }

    if found.is_empty() {
        return Ok("无法获取用户积分信息".to_string());
    }
    tracing::info!(?found, "成功获取用户积分信息");

    let mut out = String::from("📊 用户积分信息 📊\n");
    for key in USER_INFO_KEYS {
        if let Some((_, value)) = found.iter().find(|(k, _)| k == key) {
            out.push_str(&format!("📌 {}: {}\n", key, value));
        }
    }
    Ok(out)
}

/// 头部登录区域：含「登录」且不含「退出」视为未登录
pub fn is_authenticated(header_html: &str) -> bool {
    !(header_html.contains("登录") && !header_html.contains("退出"))
}
