//! Zone-scoped API sessions.

use tracing::debug;

use crate::compute::ComputeApi;
use crate::error::DriverError;

/// Returns a copy of `api` bound to the regional endpoint of `zone`.
///
/// Zone names are matched case-insensitively against the platform's zone
/// list.
///
/// # Errors
///
/// Returns [`DriverError::UnknownZone`] when the platform does not offer
/// `zone`, and [`DriverError::Api`] when listing zones fails.
pub async fn resolve<A: ComputeApi>(api: &A, zone: &str) -> Result<A, DriverError> {
    let zones = api.list_zones().await?;
    let matched = zones
        .iter()
        .find(|candidate| candidate.name.eq_ignore_ascii_case(zone.trim()))
        .ok_or_else(|| DriverError::UnknownZone {
            zone: zone.to_owned(),
        })?;
    debug!(zone = %matched.name, endpoint = %matched.api_endpoint, "resolved zone endpoint");
    Ok(api.with_endpoint(&matched.api_endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeCompute;

    #[tokio::test]
    async fn zone_rebinds_client_to_regional_endpoint() {
        let api = FakeCompute::new();

        let session = resolve(&api, "CH-DK-2").await.expect("zone exists");

        assert_eq!(
            session.endpoint().as_deref(),
            Some("https://api-ch-dk-2.exoscale.com/v2")
        );
    }

    #[tokio::test]
    async fn unknown_zone_is_a_configuration_error() {
        let api = FakeCompute::new();

        let err = resolve(&api, "mars-1").await.expect_err("zone is unknown");

        assert_eq!(
            err,
            DriverError::UnknownZone {
                zone: String::from("mars-1")
            }
        );
        assert!(err.to_string().starts_with("configuration error"));
    }
}
