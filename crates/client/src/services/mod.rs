//! Application services built on the cache, the document store and the
//! identity provider.

mod account;
mod email_action;
mod user_data;

pub use account::{AccountService, ContinueUrls};
pub use email_action::{
    ActionOutcome, EmailAction, EmailActionError, EmailActionHandler, EmailActionMode,
    RESET_CODE_KEY,
};
pub use user_data::{PreloadReport, RECENT_ORDERS_LIMIT, UserDataService};
