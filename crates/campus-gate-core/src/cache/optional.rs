use std::future::Future;

use tracing::warn;

use crate::auth::AuthError;

/// Run a required and an optional fetch concurrently.
///
/// A failed `primary` fails the whole call; a failed `secondary` is logged
/// and comes back as `None`.
pub async fn with_optional<A, B>(
    primary: impl Future<Output = Result<A, AuthError>>,
    secondary: impl Future<Output = Result<B, AuthError>>,
) -> Result<(A, Option<B>), AuthError> {
    let (primary, secondary) = futures::join!(primary, secondary);
    let primary = primary?;
    let secondary = match secondary {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Optional fetch failed, continuing without it");
            None
        }
    };
    Ok((primary, secondary))
}
