use std::{collections::BTreeSet, str::FromStr};

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use clap::Args;
use tracing::info;

pub const DEFAULT_TABLE: &str = "credential-store";

/// Which namespaces the controller may write secrets into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamespaceFilter {
    All,
    Only(BTreeSet<String>),
}

impl NamespaceFilter {
    pub fn allows(&self, namespace: &str) -> bool {
        match self {
            NamespaceFilter::All => true,
            NamespaceFilter::Only(allowed) => allowed.contains(namespace),
        }
    }
}

impl FromStr for NamespaceFilter {
    type Err = String;

    /// `*` or a comma separated list of namespace names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "*" {
            return Ok(NamespaceFilter::All);
        }

        let allowed: BTreeSet<String> = s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
            .collect();

        if allowed.is_empty() {
            return Err("expected '*' or a comma separated list of namespaces".to_owned());
        }
        Ok(NamespaceFilter::Only(allowed))
    }
}

#[derive(Args, Clone, Debug)]
pub struct Config {
    /// AWS access key used for DynamoDB and KMS; the default credential chain is used
    /// unless both keys are set
    #[arg(long = "aws-access-key-id", env = "CREDSTASH_AWS_ACCESS_KEY_ID")]
    pub access_key_id: Option<String>,

    #[arg(
        long = "aws-secret-access-key",
        env = "CREDSTASH_AWS_SECRET_ACCESS_KEY",
        hide_env_values = true
    )]
    pub secret_access_key: Option<String>,

    #[arg(long = "aws-region", env = "CREDSTASH_AWS_DEFAULT_REGION")]
    pub region: Option<String>,

    /// Credstash table used by items that don't name one
    #[arg(long, env = "CREDSTASH_DEFAULT_TABLE", default_value = DEFAULT_TABLE)]
    pub default_table: String,

    /// Namespaces allowed to declare secrets, `*` for all
    #[arg(long, env = "namespaces", default_value = "*")]
    pub namespaces: NamespaceFilter,
}

impl Config {
    pub async fn aws_sdk_config(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }

        if let (Some(id), Some(secret)) = (&self.access_key_id, &self.secret_access_key) {
            info!("Using static AWS credentials for credstash");
            loader = loader.credentials_provider(Credentials::new(
                id,
                secret,
                None,
                None,
                "credstash-controller",
            ));
        }

        loader.load().await
    }
}
