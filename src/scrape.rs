use std::path::PathBuf;

use chrono::Local;

use crate::attendance::{self, AttendanceSummary};
use crate::browser::{Page, Session};
use crate::captcha::CaptchaResolver;
use crate::config::Config;
use crate::csv_io::{self, CombineOutcome};
use crate::error::{Result, VtopError};
use crate::login::{LoginController, SecondaryChallengeHandler};
use crate::parsers;

const CALENDAR_FILE_PREFIX: &str = "academic_calendar";
const CALENDAR_OUTPUT: &str = "academic_calendar.csv";

/// Result of a calendar run. Period failures are isolated: a period that
/// never rendered its table is recorded here instead of discarding the
/// periods already extracted.
#[derive(Debug, Clone)]
pub struct CalendarOutcome {
    pub periods_total: usize,
    pub periods_extracted: usize,
    pub failed_periods: Vec<String>,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AttendanceOutcome {
    pub output: PathBuf,
    pub summary: AttendanceSummary,
}

/// Drives one authenticated session through a report flow. Owns the login
/// controller; the session is closed exactly once on every exit path.
pub struct Orchestrator {
    config: Config,
    login: LoginController,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        resolver: CaptchaResolver,
        secondary: Box<dyn SecondaryChallengeHandler>,
    ) -> Self {
        let login = LoginController::new(config.clone(), resolver, secondary);
        Self { config, login }
    }

    /// Scrapes every month of the academic calendar into one combined
    /// delimited file under the data directory.
    pub async fn run_calendar(&self, session: &mut Session) -> Result<CalendarOutcome> {
        let result = self.calendar_inner(session).await;
        self.release(session, result.is_ok()).await;
        result
    }

    /// Scrapes the attendance report and aggregates it.
    pub async fn run_attendance(&self, session: &mut Session) -> Result<AttendanceOutcome> {
        let result = self.attendance_inner(session).await;
        self.release(session, result.is_ok()).await;
        result
    }

    /// Logs in and hands the authenticated session back for interactive
    /// use. The caller owns closing it after success; failures release it
    /// here.
    pub async fn run_login(&self, session: &mut Session) -> Result<()> {
        let result = self.login.login(session).await;
        if result.is_err() {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %e, "session close failed");
            }
        }
        result
    }

    /// Guaranteed resource release: close the session, and drop the
    /// transient directory only after a fully successful run so failures
    /// stay inspectable.
    async fn release(&self, session: &mut Session, success: bool) {
        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "session close failed");
        }
        if success {
            if let Err(e) = self.config.paths.cleanup() {
                tracing::warn!(error = %e, "could not remove transient directory");
            }
        }
    }

    async fn calendar_inner(&self, session: &mut Session) -> Result<CalendarOutcome> {
        self.config.paths.prepare()?;
        self.login.login(session).await?;
        let page = session.page();
        let sel = &self.config.selectors;

        self.navigate_to_report(page, &sel.calendar_link).await?;
        page.select_value(&sel.semester_select, &self.config.semester_id)
            .await?;
        page.select_value(&sel.class_group_select, &self.config.class_group)
            .await?;
        self.config.pacing.pause().await;

        let total = page.count(&sel.period_links).await?;
        tracing::info!(total, "report periods discovered");

        let mut extracted = 0usize;
        let mut failed = Vec::new();
        for index in 0..total {
            let label = match page.nth_text(&sel.period_links, index).await? {
                Some(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => {
                    tracing::warn!(index, "period link has no readable label, skipping");
                    failed.push(format!("period #{}", index + 1));
                    continue;
                }
            };
            match self.extract_period(page, index, &label).await {
                Ok(()) => extracted += 1,
                Err(e) => {
                    tracing::warn!(period = %label, error = %e, "period extraction failed");
                    failed.push(label);
                }
            }
        }

        if extracted == 0 && total > 0 {
            return Err(VtopError::ExtractionTimeout {
                what: "calendar tables for all periods".to_string(),
                timeout: self.config.timeouts.calendar_table,
            });
        }

        let output = self.config.paths.data_dir.join(CALENDAR_OUTPUT);
        let outcome = csv_io::combine(
            &self.config.paths.temp_dir,
            CALENDAR_FILE_PREFIX,
            ".csv",
            &output,
        )?;
        if outcome == CombineOutcome::NoInput {
            tracing::warn!("no per-period files were produced");
        }

        Ok(CalendarOutcome {
            periods_total: total,
            periods_extracted: extracted,
            failed_periods: failed,
            output,
        })
    }

    /// Extracts one report period: select it, wait for its table, then run
    /// the markup through the normalize/convert pipeline.
    async fn extract_period(&self, page: &dyn Page, index: usize, label: &str) -> Result<()> {
        let sel = &self.config.selectors;
        tracing::info!(period = %label, "extracting report period");

        page.nth_click(&sel.period_links, index).await?;
        self.config.pacing.pause().await;

        if !page
            .wait_visible(&sel.calendar_table, self.config.timeouts.calendar_table)
            .await?
        {
            return Err(VtopError::ExtractionTimeout {
                what: format!("calendar table for {label}"),
                timeout: self.config.timeouts.calendar_table,
            });
        }

        let raw = page.inner_html(&sel.calendar_table).await?;
        let n = index + 1;
        let temp = &self.config.paths.temp_dir;
        let data = &self.config.paths.data_dir;

        tokio::fs::write(temp.join(format!("raw_html{n:02}.html")), &raw).await?;
        let clean = parsers::normalize(&raw);
        tokio::fs::write(data.join(format!("clean_html{n:02}.html")), &clean).await?;

        let table = parsers::parse_table(&clean, Some(label))?;
        csv_io::write_table(
            &table,
            &temp.join(format!("{CALENDAR_FILE_PREFIX}{n:02}.csv")),
        )?;
        Ok(())
    }

    async fn attendance_inner(&self, session: &mut Session) -> Result<AttendanceOutcome> {
        self.config.paths.prepare()?;
        self.login.login(session).await?;
        let page = session.page();
        let sel = &self.config.selectors;

        self.navigate_to_report(page, &sel.attendance_link).await?;
        page.select_value(&sel.semester_select, &self.config.semester_id)
            .await?;
        page.click(&sel.attendance_submit).await?;

        if !page
            .wait_visible(&sel.attendance_table, self.config.timeouts.attendance_table)
            .await?
        {
            return Err(VtopError::ExtractionTimeout {
                what: "attendance table".to_string(),
                timeout: self.config.timeouts.attendance_table,
            });
        }

        let raw = page.inner_html(&sel.attendance_table).await?;
        tracing::info!("attendance table extracted");

        let stamp = Local::now().format("%Y-%m-%d");
        let temp = &self.config.paths.temp_dir;
        let data = &self.config.paths.data_dir;

        tokio::fs::write(temp.join(format!("attendance_{stamp}.html")), &raw).await?;
        let clean = parsers::normalize(&raw);
        tokio::fs::write(data.join(format!("clean_attendance_{stamp}.html")), &clean).await?;

        let table = parsers::parse_table(&clean, None)?;
        let output = data.join(format!("attendance_{stamp}.csv"));
        csv_io::write_table(&table, &output)?;

        let summary = attendance::summarize(&output)?;
        Ok(AttendanceOutcome { output, summary })
    }

    /// Fixed navigation sequence shared by both reports: expand the
    /// sidebar, open the academics menu, follow the report link.
    async fn navigate_to_report(&self, page: &dyn Page, report_link: &str) -> Result<()> {
        let sel = &self.config.selectors;
        page.click(&sel.sidebar_toggle).await?;
        page.click(&sel.academics_menu).await?;
        page.click(report_link).await?;
        self.config.pacing.pause().await;
        Ok(())
    }
}
