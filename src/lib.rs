// Declare all our modules
mod attendance;
mod browser;
mod captcha;
mod config;
mod csv_io;
mod error;
mod login;
mod parsers;
mod scrape;

pub mod logging;

// Publicly export the parts of the library that users (and tests) need
pub use attendance::{ATTENDED_COLUMN, AttendanceSummary, COURSE_COLUMN, MissedCourse, TOTAL_COLUMN, summarize};
pub use browser::{Page, Session, WebDriverPage};
pub use captcha::{
    CaptchaResolver, GeminiRecognizer, Recognizer, SOLUTION_LEN, decode_data_uri,
    normalize_solution,
};
pub use config::{Config, Credentials, Pacing, RunPaths, Selectors, Timeouts};
pub use csv_io::{CombineOutcome, combine, write_table};
pub use error::{Result, VtopError};
pub use login::{ConsoleHandler, LoginController, LoginState, SecondaryChallengeHandler};
pub use parsers::{PERIOD_COLUMN, Table, normalize, parse_table};
pub use scrape::{AttendanceOutcome, CalendarOutcome, Orchestrator};
