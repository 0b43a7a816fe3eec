//! Chrome 会话：用 Headless Chrome 驱动论坛页面
//!
//! 每个动作批次在 blocking 线程池执行并受 60 秒硬超时约束；Tab 自身的默认等待
//! 超时也设为同样的值，避免超时后后台线程长期挂起。

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::seq::SliceRandom;

use crate::browser::{run_bounded, Post, SessionFactory, WorkerSession, ACTION_TIMEOUT};
use crate::core::WorkerError;
use crate::extract;
use crate::janitor::ProcessCensus;

const CONTENT_SELECTOR: &str = ".t.z";
const HEADER_SELECTOR: &str = "div.header_up_sign";
const LOGIN_FORM_SELECTOR: &str = ".cc.p10.regItem";
const THREAD_TEXTAREA_SELECTOR: &str = "#textarea";
const REPLY_BUTTON_SELECTOR: &str = ".btn.fpbtn";
const CHECK_IN_BUTTON_SELECTOR: &str = "#submit_bbb";
const CHECK_IN_RESULT_SELECTOR: &str = "span.f14";
const USER_INFO_SELECTOR: &str = ".pwB_uConside_a";

const USERNAME_XPATH: &str = r#"//*[@id="main"]/form/div/table/tbody/tr/td/div/dl[1]/dd/input"#;
const PASSWORD_XPATH: &str = r#"//*[@id="main"]/form/div/table/tbody/tr/td/div/dl[2]/dd/input"#;
const QUESTION_XPATH: &str = r#"//*[@id="main"]/form/div/table/tbody/tr/td/div/dl[3]/dd/select"#;
const ANSWER_XPATH: &str = r#"//*[@id="main"]/form/div/table/tbody/tr/td/div/dl[4]/dd/input"#;
const SUBMIT_XPATH: &str = r#"//*[@id="main"]/form/div/table/tbody/tr/td/div/dl[7]/dd/input"#;

/// 签到时可选的心情
const CHECK_IN_MOODS: &[&str] = &["kx", "ng", "ym", "wl", "nu", "ch", "fd", "yl", "shuai"];

const LOGIN_SETTLE: Duration = Duration::from_secs(2);
const REPLY_SETTLE: Duration = Duration::from_secs(3);
const USER_INFO_SETTLE: Duration = Duration::from_secs(5);

/// 未配置 CHROME_PATH 时依次探测的可执行文件
pub const CHROME_CANDIDATES: &[&str] = &[
    "/snap/bin/chromium",
    "chromium",
    "google-chrome",
    "chromium-browser",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
];

const CHROME_ARGS: &[&str] = &[
    "--no-default-browser-check",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-software-rasterizer",
    "--disable-extensions",
    "--disable-setuid-sandbox",
    "--disable-infobars",
    "--disable-notifications",
    "--mute-audio",
    "--ignore-certificate-errors",
    "--disable-popup-blocking",
    "--incognito",
    "--disable-translate",
    "--disable-sync",
    "--disable-background-networking",
];

/// 导出 cookie 时保留、且 CookieParam 能接受的字段
const COOKIE_PARAM_KEYS: &[&str] = &[
    "name", "value", "domain", "path", "secure", "httpOnly", "sameSite", "expires",
];

/// 登录表单内容
#[derive(Clone, Debug, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    /// 安全问题下拉框 value
    pub question: String,
    pub answer: String,
}

/// 解析浏览器路径：显式配置优先，其次按候选列表用 which 探测
pub fn resolve_executable(configured: Option<&Path>, candidates: &[&str]) -> Option<PathBuf> {
    if let Some(path) = configured {
        tracing::info!("使用环境变量中配置的Chrome路径: {}", path.display());
        return Some(path.to_path_buf());
    }
    for candidate in candidates {
        if let Ok(path) = which::which(candidate) {
            tracing::info!("自动检测到Chrome路径: {}", path.display());
            return Some(path);
        }
    }
    tracing::warn!("未找到Chrome可执行文件，请设置CHROME_PATH环境变量");
    None
}

/// 把导出的 cookies JSON 转为可注入的 CookieParam
pub fn cookie_params(blob: &[u8]) -> Result<Vec<CookieParam>, WorkerError> {
    let raw: Vec<serde_json::Value> = serde_json::from_slice(blob)
        .map_err(|e| WorkerError::Credential(format!("cookies 文件格式错误: {e}")))?;

    raw.into_iter()
        .map(|cookie| {
            let mut kept = serde_json::Map::new();
            if let serde_json::Value::Object(fields) = cookie {
                for (key, value) in fields {
                    if !COOKIE_PARAM_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    // 会话 cookie 的 expires 为 -1，注入时省略
                    if key == "expires" && value.as_f64().map(|v| v <= 0.0).unwrap_or(true) {
                        continue;
                    }
                    kept.insert(key, value);
                }
            }
            serde_json::from_value(serde_json::Value::Object(kept))
                .map_err(|e| WorkerError::Credential(format!("cookie 字段错误: {e}")))
        })
        .collect()
}

fn browser_err(e: impl std::fmt::Display) -> WorkerError {
    WorkerError::Browser(e.to_string())
}

/// 启动 Chrome 会话的工厂
pub struct ChromeLauncher {
    headless: bool,
    chrome_path: Option<PathBuf>,
    force_kill: bool,
    census: Arc<dyn ProcessCensus>,
    form: LoginForm,
    action_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(census: Arc<dyn ProcessCensus>, form: LoginForm) -> Self {
        Self {
            headless: true,
            chrome_path: None,
            force_kill: false,
            census,
            form,
            action_timeout: ACTION_TIMEOUT,
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn chrome_path(mut self, path: Option<PathBuf>) -> Self {
        self.chrome_path = path;
        self
    }

    /// 启动前强制终止所有残留浏览器进程
    pub fn force_kill(mut self, force_kill: bool) -> Self {
        self.force_kill = force_kill;
        self
    }
}

#[async_trait]
impl SessionFactory for ChromeLauncher {
    async fn create(&self) -> Result<Box<dyn WorkerSession>, WorkerError> {
        let path = resolve_executable(self.chrome_path.as_deref(), CHROME_CANDIDATES);
        if self.force_kill {
            if let Err(e) = self.census.kill_all().await {
                tracing::warn!("终止Chrome进程失败: {}", e);
            }
        }

        let headless = self.headless;
        let timeout = self.action_timeout;
        let (browser, tab) = run_bounded(timeout, move || {
            let args: Vec<&OsStr> = CHROME_ARGS.iter().map(OsStr::new).collect();
            let options = LaunchOptions::default_builder()
                .headless(headless)
                .sandbox(false)
                .path(path)
                .args(args)
                .idle_browser_timeout(Duration::from_secs(300))
                .build()
                .map_err(|e| WorkerError::Launch(e.to_string()))?;
            let browser = Browser::new(options).map_err(|e| WorkerError::Launch(e.to_string()))?;
            let tab = browser.new_tab().map_err(|e| WorkerError::Launch(e.to_string()))?;
            tab.set_default_timeout(timeout);
            Ok((browser, tab))
        })
        .await?;

        tracing::info!("浏览器实例已启动");
        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            tab: Some(tab),
            form: self.form.clone(),
            action_timeout: timeout,
        }))
    }
}

/// 一个 Chrome 进程 + 一个 Tab
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
    form: LoginForm,
    action_timeout: Duration,
}

impl ChromeSession {
    /// 在当前 Tab 上执行一批动作，受 action_timeout 约束
    async fn execute<T, F>(&self, f: F) -> Result<T, WorkerError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
    {
        let tab = self.tab.clone().ok_or(WorkerError::Closed)?;
        run_bounded(self.action_timeout, move || f(tab.as_ref()).map_err(browser_err)).await
    }
}

#[async_trait]
impl WorkerSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), WorkerError> {
        let url = url.to_string();
        self.execute(move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn login_marker(&mut self) -> Result<String, WorkerError> {
        self.execute(|tab| tab.wait_for_element(HEADER_SELECTOR)?.get_content())
            .await
    }

    async fn login(&mut self, login_url: &str) -> Result<(), WorkerError> {
        self.navigate(login_url).await?;
        self.execute(|tab| {
            tab.wait_for_element(LOGIN_FORM_SELECTOR)?;
            Ok(())
        })
        .await?;

        let form = self.form.clone();
        self.execute(move |tab| {
            tab.wait_for_xpath(USERNAME_XPATH)?.type_into(&form.username)?;
            tab.wait_for_xpath(PASSWORD_XPATH)?.type_into(&form.password)?;
            tab.wait_for_xpath(QUESTION_XPATH)?.call_js_fn(
                "function(v) { this.value = v; }",
                vec![serde_json::json!(form.question)],
                false,
            )?;
            tab.wait_for_xpath(ANSWER_XPATH)?.type_into(&form.answer)?;
            tab.wait_for_xpath(SUBMIT_XPATH)?.click()?;
            tab.wait_until_navigated()?;
            tab.wait_for_element(HEADER_SELECTOR)?;
            std::thread::sleep(LOGIN_SETTLE);
            Ok(())
        })
        .await
        .map_err(|e| {
            tracing::warn!("登陆操作出错：{}", e);
            e
        })
    }

    async fn export_credentials(&mut self) -> Result<Vec<u8>, WorkerError> {
        self.execute(|tab| {
            tab.wait_for_element(HEADER_SELECTOR)?;
            let cookies = tab.get_cookies()?;
            Ok(serde_json::to_vec(&cookies)?)
        })
        .await
    }

    async fn import_credentials(&mut self, blob: &[u8]) -> Result<(), WorkerError> {
        let params = cookie_params(blob)?;
        self.execute(move |tab| {
            tab.set_cookies(params)?;
            tab.reload(false, None)?;
            tab.wait_until_navigated()?;
            let title = tab.get_title()?;
            tracing::debug!(title = %title, "页面已刷新");
            Ok(())
        })
        .await
    }

    async fn first_post(&mut self, listing_url: &str) -> Result<Post, WorkerError> {
        let url = listing_url.to_string();
        let html = self
            .execute(move |tab| {
                tab.navigate_to(&url)?.wait_until_navigated()?;
                tab.wait_for_element(CONTENT_SELECTOR)?;
                tab.get_content()
            })
            .await?;
        extract::first_post_after_marker(&html)
    }

    async fn reply(&mut self, content: &str) -> Result<String, WorkerError> {
        let text = content.to_string();
        self.execute(move |tab| {
            tab.wait_for_element(THREAD_TEXTAREA_SELECTOR)?.type_into(&text)?;
            tab.wait_for_element(REPLY_BUTTON_SELECTOR)?.click()?;
            std::thread::sleep(REPLY_SETTLE);
            Ok(text)
        })
        .await
    }

    async fn check_in(&mut self, check_in_url: &str) -> Result<String, WorkerError> {
        self.navigate(check_in_url).await?;
        let mood = CHECK_IN_MOODS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("kx");
        self.execute(move |tab| {
            tab.wait_for_element(CHECK_IN_BUTTON_SELECTOR)?;
            let radio = format!(r#"input[name="qdxq"][value="{}"]"#, mood);
            tab.wait_for_element(&radio)?.click()?;
            tab.wait_for_element(CHECK_IN_BUTTON_SELECTOR)?.click()?;
            tab.wait_for_element(CHECK_IN_RESULT_SELECTOR)?.get_inner_text()
        })
        .await
    }

    async fn user_info(&mut self, user_info_url: &str) -> Result<String, WorkerError> {
        self.navigate(user_info_url).await?;
        let html = self
            .execute(|tab| {
                std::thread::sleep(USER_INFO_SETTLE);
                tab.wait_for_element(USER_INFO_SELECTOR)?.get_content()
            })
            .await?;
        extract::user_info_summary(&html)
    }

    fn close(&mut self) {
        self.tab.take();
        if self.browser.take().is_some() {
            tracing::info!("浏览器实例已关闭");
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.close();
    }
}
