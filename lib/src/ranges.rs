//! Published AWS address ranges.
//!
//! The maintenance rule of the security group allows a provider-assigned block
//! that AWS may change at any time; these helpers tell whether the configured
//! block still matches what AWS publishes.

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use log::debug;

use crate::error::Error;
use crate::types::IpRanges;

pub const IP_RANGES_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";
pub const INSTANCE_CONNECT: &str = "EC2_INSTANCE_CONNECT";

pub async fn fetch() -> Result<IpRanges> {
    let ranges = reqwest::get(IP_RANGES_URL)
        .await
        .context("failed to fetch ip-ranges.json")?
        .error_for_status()?
        .json::<IpRanges>()
        .await
        .context("failed to decode ip-ranges.json")?;
    debug!("ip ranges sync token: {}", ranges.sync_token);
    Ok(ranges)
}

pub fn service_ranges(ranges: &IpRanges, service: &str, region: &str) -> Vec<Ipv4Net> {
    ranges
        .prefixes
        .iter()
        .filter(|prefix| prefix.service == service && prefix.region == region)
        .filter_map(|prefix| prefix.ip_prefix.parse().ok())
        .collect()
}

pub fn instance_connect_range(ranges: &IpRanges, region: &str) -> Result<Ipv4Net, Error> {
    service_ranges(ranges, INSTANCE_CONNECT, region)
        .into_iter()
        .next()
        .ok_or_else(|| Error::NoRange {
            service: INSTANCE_CONNECT.to_string(),
            region: region.to_string(),
        })
}

/// Whether `configured` still covers every currently published block.
pub fn is_current(configured: &Ipv4Net, published: &[Ipv4Net]) -> bool {
    !published.is_empty() && published.iter().all(|range| configured.contains(range))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IpRanges {
        serde_json::from_str(
            r#"{
                "syncToken": "1700000000",
                "createDate": "2023-11-14-22-13-20",
                "prefixes": [
                    { "ip_prefix": "3.112.23.0/29", "region": "ap-northeast-1", "service": "EC2_INSTANCE_CONNECT", "network_border_group": "ap-northeast-1" },
                    { "ip_prefix": "18.206.107.24/29", "region": "us-east-1", "service": "EC2_INSTANCE_CONNECT", "network_border_group": "us-east-1" },
                    { "ip_prefix": "3.112.0.0/14", "region": "ap-northeast-1", "service": "EC2", "network_border_group": "ap-northeast-1" }
                ],
                "ipv6_prefixes": []
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_instance_connect_range() {
        let ranges = sample();
        assert_eq!(
            instance_connect_range(&ranges, "ap-northeast-1")
                .unwrap()
                .to_string(),
            "3.112.23.0/29"
        );
        assert!(matches!(
            instance_connect_range(&ranges, "eu-west-1"),
            Err(Error::NoRange { .. })
        ));
    }

    #[test]
    fn test_is_current() {
        let ranges = sample();
        let published = service_ranges(&ranges, INSTANCE_CONNECT, "ap-northeast-1");
        let configured: Ipv4Net = "3.112.23.0/29".parse().unwrap();
        let stale: Ipv4Net = "3.112.24.0/29".parse().unwrap();

        assert!(is_current(&configured, &published));
        assert!(!is_current(&stale, &published));
        assert!(!is_current(&configured, &[]));
    }
}
