// tests/scrape_test.rs
//
// End-to-end orchestrator runs against a scripted in-memory portal:
// login without a challenge, report navigation, period iteration, and the
// full table -> CSV -> combine/aggregate pipeline on real temp files.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use vtop_scraper::{
    CaptchaResolver, Config, Credentials, Orchestrator, Page, Recognizer, Result, RunPaths,
    SecondaryChallengeHandler, Session, VtopError,
};

struct NoChallengeRecognizer;

#[async_trait]
impl Recognizer for NoChallengeRecognizer {
    async fn recognize(&self, _image: &[u8]) -> Result<String> {
        panic!("no challenge is presented in these runs");
    }
}

struct UnusedHandler;

#[async_trait]
impl SecondaryChallengeHandler for UnusedHandler {
    async fn resolve(&self) -> Result<()> {
        panic!("secondary challenge handler must not be invoked");
    }
}

/// A portal where login always succeeds challenge-free, with a scripted
/// set of report periods. Periods listed in `broken_periods` never render
/// their table.
struct PortalMock {
    config: Arc<Config>,
    periods: Vec<(String, String)>,
    broken_periods: Vec<usize>,
    attendance_html: String,
    selected_period: Arc<AtomicUsize>,
    logged_in: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    clicks: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Page for PortalMock {
    async fn goto(&self, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.clicks.lock().unwrap().push(selector.to_string());
        if selector == self.config.selectors.submit_button {
            self.logged_in.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn fill(&self, _selector: &str, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn attr(&self, _selector: &str, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn text(&self, _selector: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn inner_html(&self, selector: &str) -> Result<String> {
        let sel = &self.config.selectors;
        if selector == sel.calendar_table {
            let index = self.selected_period.load(Ordering::SeqCst);
            return Ok(self.periods[index].1.clone());
        }
        if selector == sel.attendance_table {
            return Ok(self.attendance_html.clone());
        }
        Ok(String::new())
    }

    async fn select_value(&self, _selector: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        if selector == self.config.selectors.period_links {
            return Ok(self.periods.len());
        }
        Ok(0)
    }

    async fn nth_text(&self, selector: &str, index: usize) -> Result<Option<String>> {
        if selector == self.config.selectors.period_links {
            return Ok(self.periods.get(index).map(|(label, _)| label.clone()));
        }
        Ok(None)
    }

    async fn nth_click(&self, selector: &str, index: usize) -> Result<()> {
        if selector == self.config.selectors.period_links {
            self.selected_period.store(index, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn wait_visible(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        let sel = &self.config.selectors;
        Ok(if selector == sel.username_field {
            true
        } else if selector == sel.calendar_table {
            let index = self.selected_period.load(Ordering::SeqCst);
            !self.broken_periods.contains(&index)
        } else if selector == sel.attendance_table {
            true
        } else {
            false
        })
    }

    async fn current_url(&self) -> Result<String> {
        Ok(if self.logged_in.load(Ordering::SeqCst) {
            "https://portal.example/vtop/content".to_string()
        } else {
            "https://portal.example/vtop/login".to_string()
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn month_html(events: &[(&str, &str)]) -> String {
    let mut html = String::from("<tr><th>Date</th><th>Event</th></tr>");
    for (date, event) in events {
        html.push_str(&format!("<tr><td>{date}</td><td>{event}</td></tr>"));
    }
    html
}

struct Harness {
    config: Arc<Config>,
    closed: Arc<AtomicBool>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(Credentials {
            username: "student42".to_string(),
            password: "hunter2".to_string(),
        });
        config.pacing.enabled = false;
        config.paths = RunPaths {
            temp_dir: dir.path().join("temp"),
            data_dir: dir.path().join("data"),
        };
        config.paths.prepare().unwrap();
        Self {
            config: Arc::new(config),
            closed: Arc::new(AtomicBool::new(false)),
            _dir: dir,
        }
    }

    fn portal(
        &self,
        periods: Vec<(String, String)>,
        broken_periods: Vec<usize>,
        attendance_html: &str,
    ) -> PortalMock {
        PortalMock {
            config: self.config.clone(),
            periods,
            broken_periods,
            attendance_html: attendance_html.to_string(),
            selected_period: Arc::new(AtomicUsize::new(0)),
            logged_in: Arc::new(AtomicBool::new(false)),
            closed: self.closed.clone(),
            clicks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        let resolver = CaptchaResolver::new(
            Box::new(NoChallengeRecognizer),
            None,
            self.config.paths.challenge_image(),
        );
        Orchestrator::new(
            (*self.config).clone(),
            resolver,
            Box::new(UnusedHandler),
        )
    }
}

#[tokio::test]
async fn calendar_run_combines_every_period_and_cleans_up() {
    let harness = Harness::new();
    let periods = vec![
        (
            "JUL-2025".to_string(),
            month_html(&[("15-07-2025", "Registration"), ("16-07-2025", "Instruction Day")]),
        ),
        (
            "AUG-2025".to_string(),
            month_html(&[("01-08-2025", "Instruction Day")]),
        ),
    ];
    let portal = harness.portal(periods, vec![], "");
    let mut session = Session::new(Box::new(portal));

    let outcome = harness
        .orchestrator()
        .run_calendar(&mut session)
        .await
        .unwrap();

    assert_eq!(outcome.periods_total, 2);
    assert_eq!(outcome.periods_extracted, 2);
    assert!(outcome.failed_periods.is_empty());

    let mut reader = csv::Reader::from_path(&outcome.output).unwrap();
    assert_eq!(
        reader.headers().unwrap(),
        &csv::StringRecord::from(vec!["Month", "Date", "Event"])
    );
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].get(0), Some("JUL-2025"));
    assert_eq!(records[2].get(0), Some("AUG-2025"));

    // Success releases everything: session closed, transient dir removed.
    assert!(harness.closed.load(Ordering::SeqCst));
    assert!(!harness.config.paths.temp_dir.exists());
    // The cleaned per-period HTML stays in the durable directory.
    assert!(harness.config.paths.data_dir.join("clean_html01.html").exists());
}

#[tokio::test]
async fn one_broken_period_does_not_discard_the_others() {
    let harness = Harness::new();
    let periods = vec![
        ("JUL-2025".to_string(), month_html(&[("15-07-2025", "Registration")])),
        ("AUG-2025".to_string(), month_html(&[("01-08-2025", "Instruction Day")])),
        ("SEP-2025".to_string(), month_html(&[("05-09-2025", "CAT I")])),
    ];
    // The middle period's table never becomes visible.
    let portal = harness.portal(periods, vec![1], "");
    let mut session = Session::new(Box::new(portal));

    let outcome = harness
        .orchestrator()
        .run_calendar(&mut session)
        .await
        .unwrap();

    assert_eq!(outcome.periods_total, 3);
    assert_eq!(outcome.periods_extracted, 2);
    assert_eq!(outcome.failed_periods, vec!["AUG-2025".to_string()]);

    let mut reader = csv::Reader::from_path(&outcome.output).unwrap();
    let months: Vec<String> = reader
        .records()
        .map(|r| r.unwrap().get(0).unwrap().to_string())
        .collect();
    assert_eq!(months, vec!["JUL-2025", "SEP-2025"]);
}

#[tokio::test]
async fn all_periods_failing_fails_the_run_but_still_closes_the_session() {
    let harness = Harness::new();
    let periods = vec![(
        "JUL-2025".to_string(),
        month_html(&[("15-07-2025", "Registration")]),
    )];
    let portal = harness.portal(periods, vec![0], "");
    let mut session = Session::new(Box::new(portal));

    let err = harness
        .orchestrator()
        .run_calendar(&mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, VtopError::ExtractionTimeout { .. }));
    assert!(harness.closed.load(Ordering::SeqCst));
    // Failed runs keep the transient directory inspectable.
    assert!(harness.config.paths.temp_dir.exists());
}

#[tokio::test]
async fn attendance_run_extracts_once_and_aggregates() {
    let harness = Harness::new();
    let attendance = "\
<tr><th>Sl.No</th><th>Course Title</th><th>Attended Classes</th><th>Total Classes</th></tr>
<tr><td>1</td><td>Operating Systems</td><td>10</td><td>10</td></tr>
<tr><td>2</td><td>Computer Networks</td><td>8</td><td>10</td></tr>
<tr><td></td><td>Total</td><td></td><td></td></tr>";
    let portal = harness.portal(vec![], vec![], attendance);
    let mut session = Session::new(Box::new(portal));

    let outcome = harness
        .orchestrator()
        .run_attendance(&mut session)
        .await
        .unwrap();

    assert_eq!(outcome.summary.attended_sum, 18);
    assert_eq!(outcome.summary.total_sum, 20);
    assert!((outcome.summary.overall_percent - 90.0).abs() < f64::EPSILON);
    assert_eq!(outcome.summary.missed.len(), 1);
    assert_eq!(outcome.summary.missed[0].course, "Computer Networks");

    assert!(outcome.output.exists());
    assert!(harness.closed.load(Ordering::SeqCst));
    assert!(!harness.config.paths.temp_dir.exists());
}
