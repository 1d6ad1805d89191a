use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VtopError {
    #[error("Missing required configuration: {0}")]
    Configuration(String),

    #[error("WebDriver command failed: {0}")]
    WebDriver(#[from] thirtyfour::error::WebDriverError),

    #[error("The browser session has already been closed")]
    SessionClosed,

    #[error("Could not find required element on the page: {0}")]
    ElementNotFound(String),

    #[error("Request to the recognition service failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Recognition service returned an unusable response: {0}")]
    Recognition(String),

    #[error("Could not produce a valid challenge solution: {0}")]
    ChallengeSolve(String),

    #[error("Login failed after {attempts} attempts")]
    LoginExhausted { attempts: u32 },

    #[error("Login form did not appear within {timeout:?}")]
    LoginUnavailable { timeout: Duration },

    #[error("{what} did not become visible within {timeout:?}")]
    ExtractionTimeout { what: String, timeout: Duration },

    #[error("Extracted table has no rows")]
    EmptyTable,

    #[error("Row {row} has {found} cells, expected {expected}")]
    RowShapeMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Duplicate column name in table header: {0:?}")]
    DuplicateColumn(String),

    #[error("Combined inputs disagree on columns: {0}")]
    SchemaMismatch(String),

    #[error("Attendance aggregation failed: {0}")]
    Aggregation(String),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VtopError {
    /// Errors that invalidate one login attempt but not the whole run.
    /// The login controller retries on these; everything else aborts.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VtopError::ChallengeSolve(_) | VtopError::Recognition(_) | VtopError::Request(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VtopError>;
