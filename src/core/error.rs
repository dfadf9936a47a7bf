use std::error::Error as StdError;
use std::fmt;

/// Errors surfaced to the embedding UI.
///
/// `Cancelled` is deliberately part of the taxonomy: a user abort reaches the
/// same call sites as upstream failures and callers must be able to swallow
/// it without showing an error. Malformed stream frames never appear here;
/// they are skipped inside the transport loop.
#[derive(Debug)]
pub enum ChatError {
    /// Denied locally by the ledger before any I/O. Carries the formatted
    /// message naming tier, action kind and numeric limit.
    QuotaExceeded { message: String },

    /// Upstream 429/503. Distinct from `Upstream` so the UI can offer a
    /// wait-and-retry affordance.
    RateLimited { status: u16 },

    /// Any other non-2xx response or transport failure.
    Upstream {
        status: Option<u16>,
        message: String,
    },

    /// The image endpoint answered without an image. Holds whatever
    /// narrative text came back (often a refusal).
    NoImageReturned { narrative: Option<String> },

    /// Wallet balance too low for the requested credit package.
    InsufficientBalance { required: f64, available: f64 },

    /// User-initiated abort. Never shown as an error and never rolls back
    /// quota that was already consumed.
    Cancelled,

    /// A request was submitted while another one was still streaming.
    Busy,
}

impl ChatError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ChatError::RateLimited { .. })
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, ChatError::QuotaExceeded { .. })
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 429 || status.as_u16() == 503 => {
                ChatError::RateLimited {
                    status: status.as_u16(),
                }
            }
            status => ChatError::Upstream {
                status: status.map(|s| s.as_u16()),
                message: err.to_string(),
            },
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::QuotaExceeded { message } => write!(f, "{message}"),
            ChatError::RateLimited { status } => {
                write!(f, "Upstream is rate limited ({status}). Wait and retry.")
            }
            ChatError::Upstream { status, message } => match status {
                Some(status) => write!(f, "API error ({status}): {message}"),
                None => write!(f, "API error: {message}"),
            },
            ChatError::NoImageReturned { narrative } => match narrative {
                Some(text) => write!(f, "Model returned text instead of an image: \"{text}\""),
                None => write!(f, "No image was produced; a safety filter may have applied."),
            },
            ChatError::InsufficientBalance {
                required,
                available,
            } => write!(
                f,
                "Insufficient balance: {required:.2} needed, {available:.2} available."
            ),
            ChatError::Cancelled => write!(f, "cancelled"),
            ChatError::Busy => write!(f, "a request is already streaming"),
        }
    }
}

impl StdError for ChatError {}
