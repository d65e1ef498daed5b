use serde::de::StdError;
use std::fmt;
use std::sync::PoisonError;
use thiserror::Error;

pub type ArgusResult<T, E = ArgusError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum ArgusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tree-sitter error: {0}")]
    TreeSitter(#[from] tree_sitter::LanguageError),

    #[error("connection-pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("time error: {0}")]
    Time(#[from] std::time::SystemTimeError),

    #[error("malformed AST: {0}")]
    MalformedAst(String),

    #[error("oracle response rejected: {0}")]
    Oracle(String),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("poisoned lock: {0}")]
    Poison(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync + 'static>),

    #[error("{0}")]
    Msg(String),
}

impl<T> From<PoisonError<T>> for ArgusError
where
    T: fmt::Debug,
{
    fn from(err: PoisonError<T>) -> Self {
        ArgusError::Poison(err.to_string())
    }
}

impl From<&str> for ArgusError {
    fn from(s: &str) -> Self {
        ArgusError::Msg(s.to_owned())
    }
}

impl From<String> for ArgusError {
    fn from(s: String) -> Self {
        ArgusError::Msg(s)
    }
}

#[test]
fn io_conversion_retains_message() {
    let e = std::io::Error::other("boom!");
    let a: ArgusError = e.into();
    assert!(matches!(a, ArgusError::Io(_)));
    assert!(a.to_string().contains("boom"));
}

#[test]
fn poison_conversion_maps_correct_variant() {
    let lock = std::sync::Arc::new(std::sync::Mutex::new(()));

    {
        let lock2 = std::sync::Arc::clone(&lock);
        std::thread::spawn(move || {
            let _guard = lock2.lock().unwrap();
            panic!("intentional – poison the mutex");
        })
        .join()
        .ok();
    }

    let poison = lock.lock().unwrap_err();
    let argus: ArgusError = poison.into();

    assert!(matches!(argus, ArgusError::Poison(_)));
}

#[test]
fn simple_string_into_msg() {
    let argus: ArgusError = "plain msg".into();
    assert!(matches!(argus, ArgusError::Msg(s) if s == "plain msg"));
}

#[test]
fn cancelled_is_terse() {
    assert_eq!(ArgusError::Cancelled.to_string(), "analysis cancelled");
}
