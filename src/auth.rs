use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};

use crate::tenant::{self, CalendarError};

/// One shared cleartext password for every user and calendar.
///
/// The requested calendar is checked before the password exchange, so a
/// client naming an unusable calendar fails at startup rather than on its
/// first statement. A missing database name is fine: the connection falls
/// back to the default calendar.
#[derive(Debug)]
pub struct CalClashAuthSource {
    password: String,
}

impl CalClashAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

fn check_calendar(database: Option<&str>) -> Result<(), CalendarError> {
    database.map_or(Ok(()), tenant::validate_name)
}

fn startup_err(e: CalendarError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "FATAL".into(),
        "08006".into(),
        format!("calendar error: {e}"),
    )))
}

#[async_trait]
impl AuthSource for CalClashAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let calendar = login.database().map(str::to_owned);
        tracing::debug!(user = ?login.user(), calendar = ?calendar, "password requested");
        if let Err(e) = check_calendar(calendar.as_deref()) {
            tracing::warn!(calendar = ?calendar, error = %e, "startup rejected");
            return Err(startup_err(e));
        }
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
