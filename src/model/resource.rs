use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Namespaces,
    Services,
    ConfigGroups,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [ResourceType::Namespaces, ResourceType::Services, ResourceType::ConfigGroups];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Namespaces => "namespaces",
            ResourceType::Services => "services",
            ResourceType::ConfigGroups => "config_groups",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ResourceType {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "namespace" | "namespaces" => Ok(ResourceType::Namespaces),
            "1" | "service" | "services" => Ok(ResourceType::Services),
            "2" | "config_group" | "config_groups" | "configgroups" => Ok(ResourceType::ConfigGroups),
            other => Err(AuthError::validation(format!("unknown resource type '{}'", other))),
        }
    }
}

/// Requested action on a set of resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Create,
    Modify,
    Delete,
}

impl Operation {
    pub fn is_write(self) -> bool { !matches!(self, Operation::Read) }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Modify => "modify",
            Operation::Delete => "delete",
        }
    }
}

/// A resource named by an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub res_type: ResourceType,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Owning main-account id; wildcard strategy resources match on it.
    #[serde(default)]
    pub owner: String,
}

impl ResourceEntry {
    pub fn namespace(name: &str, owner: &str) -> Self {
        Self { res_type: ResourceType::Namespaces, id: name.to_string(), name: name.to_string(), namespace: name.to_string(), owner: owner.to_string() }
    }

    pub fn service(id: &str, namespace: &str, name: &str, owner: &str) -> Self {
        Self { res_type: ResourceType::Services, id: id.to_string(), name: name.to_string(), namespace: namespace.to_string(), owner: owner.to_string() }
    }

    pub fn config_group(id: &str, namespace: &str, name: &str, owner: &str) -> Self {
        Self { res_type: ResourceType::ConfigGroups, id: id.to_string(), name: name.to_string(), namespace: namespace.to_string(), owner: owner.to_string() }
    }

    /// `type/id`, used in denial messages and logs.
    pub fn label(&self) -> String { format!("{}/{}", self.res_type, self.id) }
}
