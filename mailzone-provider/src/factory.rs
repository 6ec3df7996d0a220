//! Provider factory functions.

use std::sync::Arc;

use crate::error::{ProviderError, Result};
use crate::http_client::ClientSettings;
use crate::traits::DnsProvider;
use crate::types::ProviderCredentials;

#[cfg(feature = "cloudflare")]
use crate::providers::CloudflareProvider;

/// Creates a [`DnsProvider`] instance from the given credentials.
///
/// The concrete provider type is determined by the [`ProviderCredentials`] variant;
/// `settings` controls its rate limit, retry policy and API endpoint.
///
/// # Examples
///
/// ```rust,no_run
/// use mailzone_provider::{create_provider, ClientSettings, ProviderCredentials};
///
/// let provider = create_provider(
///     ProviderCredentials::Cloudflare {
///         api_token: "your-token".to_string(),
///     },
///     &ClientSettings::default(),
/// )
/// .unwrap();
/// ```
pub fn create_provider(
    credentials: ProviderCredentials,
    settings: &ClientSettings,
) -> Result<Arc<dyn DnsProvider>> {
    if let Err(e) = credentials.validate() {
        return Err(ProviderError::InvalidCredentials {
            provider: "factory".to_string(),
            raw_message: Some(e.to_string()),
        });
    }

    match credentials {
        #[cfg(feature = "cloudflare")]
        ProviderCredentials::Cloudflare { api_token } => Ok(Arc::new(
            CloudflareProvider::with_settings(api_token, settings)?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_rejected() {
        let result = create_provider(
            ProviderCredentials::Cloudflare {
                api_token: String::new(),
            },
            &ClientSettings::default(),
        );
        assert!(matches!(
            result,
            Err(ProviderError::InvalidCredentials { .. })
        ));
    }

    #[test]
    fn creates_cloudflare_provider() {
        let provider = create_provider(
            ProviderCredentials::Cloudflare {
                api_token: "token".to_string(),
            },
            &ClientSettings::default(),
        );
        assert!(matches!(provider, Ok(p) if p.id() == "cloudflare"));
    }
}
