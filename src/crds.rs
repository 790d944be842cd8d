use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    ResourceExt,
    api::{ApiResource, DynamicObject, GroupVersionKind},
};
use schemars::{JsonSchema, r#gen::SchemaSettings};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};

pub const GROUP: &str = "credstash.local";
pub const VERSION: &str = "v1";
pub const KIND: &str = "CredstashSecret";
pub const PLURAL: &str = "credstashsecrets";

/// One credstash lookup and where its value lands in the derived secret.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SecretItem {
    /// Name of the credential in credstash
    #[serde(rename = "from")]
    pub source_name: String,
    /// Key in the generated secret's data
    #[serde(rename = "key")]
    pub target_key: String,
    /// Credstash version, passed through verbatim
    pub version: String,
    /// DynamoDB table holding the credential, defaults to the controller's table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl SecretItem {
    pub fn parse(index: usize, raw: &Value) -> Result<Self> {
        serde_json::from_value(raw.clone()).map_err(|source| Error::MalformedItem { index, source })
    }
}

/// The parts of a `CredstashSecret` the reconciler needs.
///
/// Items stay as raw JSON so a single malformed entry fails the pass that reaches it
/// instead of the whole watch event failing to decode.
#[derive(Clone, Debug)]
pub struct CredstashSecret {
    pub namespace: String,
    pub name: String,
    pub items: Vec<Value>,
}

impl CredstashSecret {
    /// Returns `None` when the identity or an array `spec` is missing.
    pub fn from_object(obj: &DynamicObject) -> Option<Self> {
        let items = obj.data.get("spec")?.as_array()?.clone();

        Some(Self {
            namespace: obj.namespace()?,
            name: obj.metadata.name.clone()?,
            items,
        })
    }
}

pub fn api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(GROUP, VERSION, KIND), PLURAL)
}

fn item_schema() -> Result<Value, serde_json::Error> {
    let root = SchemaSettings::openapi3()
        .into_generator()
        .into_root_schema_for::<SecretItem>();

    serde_json::to_value(root.schema)
}

/// The CustomResourceDefinition for `CredstashSecret`. Its spec is a bare list of
/// items, which the derive macro can't express, so it is assembled by hand.
pub fn crd() -> Result<CustomResourceDefinition, serde_json::Error> {
    serde_json::from_value(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": format!("{PLURAL}.{GROUP}") },
        "spec": {
            "group": GROUP,
            "scope": "Namespaced",
            "names": {
                "kind": KIND,
                "plural": PLURAL,
                "singular": KIND.to_lowercase(),
            },
            "versions": [{
                "name": VERSION,
                "served": true,
                "storage": true,
                "schema": {
                    "openAPIV3Schema": {
                        "type": "object",
                        "properties": {
                            "spec": {
                                "type": "array",
                                "items": item_schema()?,
                            }
                        }
                    }
                }
            }]
        }
    }))
}
