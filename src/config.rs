use rand::Rng;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, VtopError};

pub const DEFAULT_ENTRY_URL: &str = "https://vtopcc.vit.ac.in/";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
pub const DEFAULT_SEMESTER_ID: &str = "CH20252601";
pub const DEFAULT_CLASS_GROUP: &str = "ALL";
pub const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;

/// Portal credentials, sourced from the process environment before any
/// session is opened.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        let username = require_env("VTOP_USERNAME")?;
        let password = require_env("VTOP_PASSWORD")?;
        Ok(Self { username, password })
    }
}

fn require_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(VtopError::Configuration(format!("{name} is not set"))),
    }
}

/// Element identifiers for the portal UI.
///
/// This is a versioned contract with the external site: any upstream markup
/// change lands here and nowhere else.
#[derive(Debug, Clone)]
pub struct Selectors {
    /// "Student" entry link on the role-selection page.
    pub student_login_link: String,
    pub username_field: String,
    pub password_field: String,
    pub challenge_image: String,
    pub challenge_input: String,
    pub submit_button: String,
    /// Alert region that carries the invalid-challenge message.
    pub alert_region: String,
    /// Message text that marks a rejected challenge solution.
    pub invalid_challenge_text: String,
    /// Marker for the secondary, human-only verification widget.
    pub secondary_challenge: String,
    /// Dismiss button of the post-login informational overlay.
    pub popup_dismiss: String,
    pub sidebar_toggle: String,
    pub academics_menu: String,
    pub calendar_link: String,
    pub attendance_link: String,
    pub semester_select: String,
    pub class_group_select: String,
    /// One link per report period (calendar month).
    pub period_links: String,
    pub calendar_table: String,
    pub attendance_submit: String,
    pub attendance_table: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            student_login_link: "#stdForm a".into(),
            username_field: "#username".into(),
            password_field: "#password".into(),
            challenge_image: "#captchaBlock img".into(),
            challenge_input: "#captchaStr".into(),
            submit_button: "#submitBtn".into(),
            alert_region: "[role='alert']".into(),
            invalid_challenge_text: "Invalid Captcha".into(),
            secondary_challenge: "iframe[src*='recaptcha']".into(),
            popup_dismiss: "#btnClosePopup".into(),
            sidebar_toggle: "#vtopHeader button[data-bs-target='#expandedSideBar']".into(),
            academics_menu: "#acMenuItemHDG0067 button".into(),
            calendar_link:
                "#acMenuCollapseHDG0067 a[data-url='academics/common/CalendarPreview']".into(),
            attendance_link:
                "#acMenuCollapseHDG0067 a[data-url='academics/common/StudentAttendance']".into(),
            semester_select: "#semesterSubId".into(),
            class_group_select: "#classGroupId".into(),
            period_links: "#getListForSemester a".into(),
            calendar_table: "#list-wrapper table".into(),
            attendance_submit: "#viewStudentAttendance button[type='submit']".into(),
            attendance_table: "#getStudentDetails table[class=table]".into(),
        }
    }
}

/// Bounded waits, one per UI condition. All waits in the system go through
/// these; there are no unbounded blocks.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Login form readiness after navigation.
    pub page_settle: Duration,
    /// Challenge-image probe. Absence after this wait is the valid
    /// "no challenge" branch, not an error.
    pub challenge_probe: Duration,
    /// Invalid-challenge alert probe after submit.
    pub alert_probe: Duration,
    pub calendar_table: Duration,
    pub attendance_table: Duration,
    pub popup_dismiss: Duration,
    /// Deadline around the remote recognition call.
    pub recognition: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_settle: Duration::from_secs(25),
            challenge_probe: Duration::from_secs(5),
            alert_probe: Duration::from_secs(5),
            calendar_table: Duration::from_secs(10),
            attendance_table: Duration::from_secs(5),
            popup_dismiss: Duration::from_secs(20),
            recognition: Duration::from_secs(30),
        }
    }
}

/// Filesystem layout for one run: a transient directory for intermediate
/// artifacts and a durable one for final outputs.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub temp_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Default for RunPaths {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("temp"),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl RunPaths {
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.temp_dir)?;
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Removes the transient directory. Called once at successful run
    /// completion; on failure the directory is left inspectable.
    pub fn cleanup(&self) -> Result<()> {
        if self.temp_dir.exists() {
            fs::remove_dir_all(&self.temp_dir)?;
        }
        Ok(())
    }

    /// Where the decoded challenge image is persisted (overwritten on
    /// repeat solves).
    pub fn challenge_image(&self) -> PathBuf {
        self.temp_dir.join("captcha.jpg")
    }
}

/// Randomized pacing between UI steps, to avoid hammering the portal with
/// machine-speed interactions.
#[derive(Debug, Clone)]
pub struct Pacing {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub enabled: bool,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min_delay_ms: 500,
            max_delay_ms: 1500,
            enabled: true,
        }
    }
}

impl Pacing {
    pub async fn pause(&self) {
        if !self.enabled {
            return;
        }
        let ms = rand::rng().random_range(self.min_delay_ms..=self.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Everything a run needs, assembled once up front and passed down
/// explicitly. No component reads the environment on its own.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub entry_url: String,
    pub webdriver_url: String,
    pub semester_id: String,
    pub class_group: String,
    pub max_login_attempts: u32,
    pub selectors: Selectors,
    pub timeouts: Timeouts,
    pub paths: RunPaths,
    pub pacing: Pacing,
}

impl Config {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            entry_url: DEFAULT_ENTRY_URL.into(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.into(),
            semester_id: DEFAULT_SEMESTER_ID.into(),
            class_group: DEFAULT_CLASS_GROUP.into(),
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            selectors: Selectors::default(),
            timeouts: Timeouts::default(),
            paths: RunPaths::default(),
            pacing: Pacing::default(),
        }
    }

    /// Builds a config from the process environment. Fails before any
    /// browser or network resource is acquired.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(Credentials::from_env()?);
        if let Ok(url) = env::var("WEBDRIVER_URL") {
            config.webdriver_url = url;
        }
        if let Ok(semester) = env::var("VTOP_SEMESTER") {
            config.semester_id = semester;
        }
        Ok(config)
    }
}
