mod analytics;
mod billing;
mod content;
mod conversations;
mod messages;
mod users;

pub use analytics::bucket_by_day;
pub use billing::{DAYS_PER_BILLING_MONTH, MAX_BILLING_MONTHS, subscription_expiry};
pub use users::MAX_RESET_ATTEMPTS;

use anyhow::Result;

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
