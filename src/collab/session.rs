//! Token refresh policy for remote calls

use tracing::warn;

use super::{ApiError, RemoteApi};

/// Run `call`, refreshing the access token once if it is rejected.
///
/// A second rejection, or a failed refresh, ends the session with
/// [`ApiError::SessionExpired`]. Other errors pass through untouched.
pub fn with_token_refresh<T>(
    api: &dyn RemoteApi,
    mut call: impl FnMut(&dyn RemoteApi) -> Result<T, ApiError>,
) -> Result<T, ApiError> {
    match call(api) {
        Err(ApiError::Unauthorized) => {
            warn!("access token rejected, attempting refresh");
            if !api.refresh_token() {
                return Err(ApiError::SessionExpired);
            }
            match call(api) {
                Err(ApiError::Unauthorized) => Err(ApiError::SessionExpired),
                other => other,
            }
        }
        other => other,
    }
}
