use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl SavedResource {
    pub fn new(ty: &str, properties: Value) -> Self {
        Self {
            ty: ty.to_string(),
            properties,
            depends_on: vec![],
        }
    }

    pub fn depends_on(mut self, logical_name: &str) -> Self {
        self.depends_on.push(logical_name.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedParameter {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

/// a cloudformation template. maps are ordered so that
/// the same set of resources always serializes to the same template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, SavedParameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for SavedTemplate {
    fn default() -> Self {
        Self {
            version: TEMPLATE_FORMAT_VERSION.to_string(),
            parameters: Default::default(),
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl SavedTemplate {
    pub fn has_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn add_resource(&mut self, name: &str, resource: SavedResource) -> Result<(), String> {
        if let Some(err) = verify_resource_name(name) {
            return Err(err);
        }
        if self.resources.contains_key(name) {
            return Err(format!("Duplicate resource name {:?}\nEach resource in a template must have a unique logical name", name));
        }
        self.resources.insert(name.to_string(), resource);
        Ok(())
    }

    /// parameters are always strings. adding the same parameter twice is fine,
    /// the first description wins.
    pub fn add_string_parameter(&mut self, name: &str, description: &str) -> Result<(), String> {
        if let Some(err) = verify_resource_name(name) {
            return Err(err);
        }
        self.parameters.entry(name.to_string()).or_insert_with(|| SavedParameter {
            ty: "String".to_string(),
            description: if description.is_empty() { None } else { Some(description.to_string()) },
        });
        Ok(())
    }

    pub fn add_output(&mut self, name: &str, description: &str, value: Value) -> Result<(), String> {
        if let Some(err) = verify_resource_name(name) {
            return Err(err);
        }
        self.outputs.insert(name.to_string(), ResourceOutput {
            description: description.to_string(),
            value,
        });
        Ok(())
    }

    /// we make it pretty so if a user needs to look at the stack in Cfn console, it looks nice
    pub fn to_json_pretty(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| format!("Failed to serialize template\n{:#?}", e))
    }
}

pub fn verify_resource_name(resource_name: &str) -> Option<String> {
    if resource_name.len() > 255 {
        return Some(format!("Invalid resource name {:?}\nmust be less than 255 characters", resource_name));
    }
    if resource_name.len() < 1 {
        return Some(format!("Invalid resource name {:?}\nMust contain at least 1 character", resource_name));
    }
    if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(format!("Invalid resource name {:?}\nMust contain only alphanumeric characters [A-Za-z0-9]", resource_name));
    }
    None
}

pub fn reference(logical_name: &str) -> Value {
    serde_json::json!({ "Ref": logical_name })
}

pub fn get_att(logical_name: &str, attribute: &str) -> Value {
    serde_json::json!({ "Fn::GetAtt": [logical_name, attribute] })
}

pub fn sub(template: &str) -> Value {
    serde_json::json!({ "Fn::Sub": template })
}
