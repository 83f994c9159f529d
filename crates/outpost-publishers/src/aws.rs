use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Shared AWS SDK configuration for the SNS and SQS adapters.
///
/// Credentials come from the default provider chain. `endpoint_url` points the
/// clients at AWS-compatible services such as LocalStack.
pub(crate) async fn load_sdk_config(
    region: Option<String>,
    endpoint_url: Option<String>,
) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    if let Some(endpoint) = endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}
