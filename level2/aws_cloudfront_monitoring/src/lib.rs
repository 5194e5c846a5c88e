//! Declares the custom resource that keeps a CloudFront distribution's
//! realtime metrics subscription in the desired state.
//!
//! `AWS::CloudFront::Distribution` has no property for the monitoring
//! subscription, so we deploy a small lambda (the `realtime-metrics-handler` binary)
//! and invoke it through an `AWS::CloudFormation::CustomResource`.
//!
//! NOTE: removing the custom resource from a stack does NOT disable the
//! subscription. The handler answers `Delete` without touching CloudFront,
//! because the subscription is an account level setting that should outlive
//! this automation. Disabling has to be done explicitly by deploying with
//! `enabled = false`.

use aws_cfn_stack::{get_att, reference, sub, verify_resource_name, SavedResource, SavedTemplate};
use serde_json::json;

pub const DISTRIBUTION_ID_KEY: &str = "DistributionId";
pub const REALTIME_METRICS_KEY: &str = "RealtimeMetrics";

pub const CUSTOM_RESOURCE_TYPE: &str = "AWS::CloudFormation::CustomResource";
pub const POLICY_SID: &str = "AllowSetRealtimeMonitoringSubscription";

/// retention values accepted by `AWS::Logs::LogGroup`.
pub const VALID_LOG_RETENTION_DAYS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922, 3288, 3653,
];

/// Two-valued tag for the desired state.
///
/// CloudFormation only invokes a custom resource again when its logical id
/// or properties change, so this tag is baked into the logical id: flipping
/// the desired state always yields a new resource and a fresh invocation.
pub fn identity(enabled: bool) -> &'static str {
    if enabled { "1" } else { "0" }
}

/// logical id of the custom resource for a given lambda resource name.
pub fn logical_id(resource_name: &str, enabled: bool) -> String {
    format!("Invoke{resource_name}{}", identity(enabled))
}

/// the distribution whose subscription we manage.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    /// logical name of an `AWS::CloudFront::Distribution` in the same template.
    /// its `Ref` resolves to the distribution id.
    Resource(String),
    /// id of a distribution managed elsewhere.
    Id(String),
}

impl Distribution {
    fn id_value(&self) -> serde_json::Value {
        match self {
            Distribution::Resource(name) => reference(name),
            Distribution::Id(id) => json!(id),
        }
    }
}

pub struct Input {
    /// logical name of the lambda function in cloudformation. The role,
    /// log group and custom resource names are derived from it.
    /// Must be alphanumeric.
    pub resource_name: String,
    /// physical name of the function. Leave empty to let cloudformation generate one.
    /// max 64 characters.
    pub function_name: String,
    pub description: String,
    /// Valid values: 128 - 10240
    pub memory_size: u64,
    /// in seconds. Valid values: 1 - 900
    pub timeout: u32,
    /// must be one of `VALID_LOG_RETENTION_DAYS`
    pub log_retention_days: u32,
    /// name of the template parameter holding the bucket of the zipped `bootstrap` binary
    pub artifact_bucket_param: String,
    /// name of the template parameter holding the key of the zipped `bootstrap` binary
    pub artifact_key_param: String,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            resource_name: "MonitoringSubscriptionLambda".into(),
            function_name: "".into(),
            description: "Sets or disables the CloudFront realtime monitoring subscription".into(),
            // minimum
            memory_size: 128,
            timeout: 8,
            log_retention_days: 1,
            artifact_bucket_param: "ArtifactBucketMonitoringSubscription".into(),
            artifact_key_param: "ArtifactKeyMonitoringSubscription".into(),
        }
    }
}

impl Input {
    pub fn role_name(&self) -> String {
        format!("Role{}", self.resource_name)
    }

    pub fn log_group_name(&self) -> String {
        format!("LogGroup{}", self.resource_name)
    }

    pub fn custom_resource_name(&self, enabled: bool) -> String {
        logical_id(&self.resource_name, enabled)
    }

    pub fn is_valid(&self) -> Option<String> {
        if let Some(err_msg) = verify_resource_name(&self.resource_name) {
            return Some(err_msg);
        }
        // the derived names get a prefix, they still have to fit.
        if let Some(err_msg) = verify_resource_name(&self.custom_resource_name(true)) {
            return Some(err_msg);
        }
        if self.function_name.len() > 64 {
            return Some(format!("Invalid function name {:?}\nMust be at most 64 characters", self.function_name));
        }
        if self.memory_size < 128 || self.memory_size > 10240 {
            return Some(format!("Invalid memory size {:?}\nMust be between 128 and 10240", self.memory_size));
        }
        if self.timeout < 1 || self.timeout > 900 {
            return Some(format!("Invalid timeout {:?}\nMust be between 1 and 900", self.timeout));
        }
        if !VALID_LOG_RETENTION_DAYS.contains(&self.log_retention_days) {
            return Some(format!("Invalid log retention {:?}\nMust be one of {:?}", self.log_retention_days, VALID_LOG_RETENTION_DAYS));
        }
        if let Some(err_msg) = verify_resource_name(&self.artifact_bucket_param) {
            return Some(err_msg);
        }
        verify_resource_name(&self.artifact_key_param)
    }

    fn role(&self) -> SavedResource {
        SavedResource::new("AWS::IAM::Role", json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": "lambda.amazonaws.com" },
                    "Action": ["sts:AssumeRole"],
                }],
            },
            "ManagedPolicyArns": [
                "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole",
            ],
            "Policies": [{
                "PolicyName": POLICY_SID,
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Sid": POLICY_SID,
                        "Effect": "Allow",
                        "Action": [
                            "cloudfront:GetMonitoringSubscription",
                            "cloudfront:CreateMonitoringSubscription",
                            "cloudfront:DeleteMonitoringSubscription",
                        ],
                        "Resource": "*",
                    }],
                },
            }],
        }))
    }

    fn function(&self, distribution: &Distribution) -> SavedResource {
        let mut properties = json!({
            "Description": self.description,
            "Runtime": "provided.al2",
            "Handler": "bootstrap",
            "Architectures": ["arm64"],
            "MemorySize": self.memory_size,
            "Timeout": self.timeout,
            "Role": get_att(&self.role_name(), "Arn"),
            "Code": {
                "S3Bucket": reference(&self.artifact_bucket_param),
                "S3Key": reference(&self.artifact_key_param),
            },
        });
        if !self.function_name.is_empty() {
            properties["FunctionName"] = json!(self.function_name);
        }
        let resource = SavedResource::new("AWS::Lambda::Function", properties);
        match distribution {
            Distribution::Resource(name) => resource.depends_on(name),
            Distribution::Id(_) => resource,
        }
    }

    fn log_group(&self) -> SavedResource {
        SavedResource::new("AWS::Logs::LogGroup", json!({
            "LogGroupName": sub(&format!("/aws/lambda/${{{}}}", self.resource_name)),
            "RetentionInDays": self.log_retention_days,
        }))
    }

    fn custom_resource(&self, distribution: &Distribution, enabled: bool) -> SavedResource {
        SavedResource::new(CUSTOM_RESOURCE_TYPE, json!({
            "ServiceToken": get_att(&self.resource_name, "Arn"),
            DISTRIBUTION_ID_KEY: distribution.id_value(),
            REALTIME_METRICS_KEY: enabled,
        })).depends_on(&self.log_group_name())
    }
}

/// Adds the lambda, its role and log group, and the custom resource that invokes it
/// to `template`. Returns the logical id of the custom resource.
pub fn set_realtime_metrics(
    template: &mut SavedTemplate,
    input: &Input,
    distribution: &Distribution,
    enabled: bool,
) -> Result<String, String> {
    if let Some(err) = input.is_valid() {
        return Err(err);
    }
    match distribution {
        Distribution::Resource(name) => {
            if let Some(err) = verify_resource_name(name) {
                return Err(err);
            }
        }
        Distribution::Id(id) => {
            if id.is_empty() {
                return Err("Invalid distribution id \"\"\nMust not be empty".into());
            }
        }
    }
    let custom_resource_name = input.custom_resource_name(enabled);
    // check everything up front so a failure leaves the template untouched.
    let names = [
        input.role_name(),
        input.resource_name.clone(),
        input.log_group_name(),
        custom_resource_name.clone(),
    ];
    if let Some(existing) = names.iter().find(|n| template.has_resource(n)) {
        return Err(format!("Resource {:?} already exists in the template\nUse a different resource_name for each distribution", existing));
    }

    template.add_string_parameter(&input.artifact_bucket_param, "S3 bucket of the realtime metrics handler artifact")?;
    template.add_string_parameter(&input.artifact_key_param, "S3 key of the realtime metrics handler artifact")?;
    template.add_resource(&input.role_name(), input.role())?;
    template.add_resource(&input.resource_name, input.function(distribution))?;
    template.add_resource(&input.log_group_name(), input.log_group())?;
    template.add_resource(&custom_resource_name, input.custom_resource(distribution, enabled))?;
    Ok(custom_resource_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist() -> Distribution {
        Distribution::Resource("Distribution".into())
    }

    #[test]
    fn identity_is_distinct_per_state() {
        assert_ne!(identity(true), identity(false));
        assert_eq!(identity(true), identity(true));
        assert_eq!(logical_id("MonitoringSubscriptionLambda", true), "InvokeMonitoringSubscriptionLambda1");
        assert_eq!(logical_id("MonitoringSubscriptionLambda", false), "InvokeMonitoringSubscriptionLambda0");
    }

    #[test]
    fn flipping_state_changes_custom_resource_id() {
        let mut on = SavedTemplate::default();
        let mut off = SavedTemplate::default();
        let on_id = set_realtime_metrics(&mut on, &Input::default(), &dist(), true).unwrap();
        let off_id = set_realtime_metrics(&mut off, &Input::default(), &dist(), false).unwrap();
        assert_ne!(on_id, off_id);
        assert!(on.has_resource(&on_id));
        assert!(!on.has_resource(&off_id));
        assert!(off.has_resource(&off_id));
    }

    #[test]
    fn emits_all_resources() {
        let mut template = SavedTemplate::default();
        let id = set_realtime_metrics(&mut template, &Input::default(), &dist(), true).unwrap();
        assert_eq!(template.resources.len(), 4);
        assert_eq!(template.parameters.len(), 2);

        let custom = &template.resources[&id];
        assert_eq!(custom.ty, CUSTOM_RESOURCE_TYPE);
        assert_eq!(custom.properties[DISTRIBUTION_ID_KEY], json!({ "Ref": "Distribution" }));
        assert_eq!(custom.properties[REALTIME_METRICS_KEY], json!(true));
        assert_eq!(custom.properties["ServiceToken"], json!({ "Fn::GetAtt": ["MonitoringSubscriptionLambda", "Arn"] }));

        let function = &template.resources["MonitoringSubscriptionLambda"];
        assert_eq!(function.depends_on, vec!["Distribution".to_string()]);
        assert_eq!(function.properties["MemorySize"], 128);
        assert_eq!(function.properties["Timeout"], 8);
        assert!(function.properties.get("FunctionName").is_none());

        let log_group = &template.resources["LogGroupMonitoringSubscriptionLambda"];
        assert_eq!(log_group.properties["RetentionInDays"], 1);
        assert_eq!(log_group.properties["LogGroupName"], json!({ "Fn::Sub": "/aws/lambda/${MonitoringSubscriptionLambda}" }));

        let role = &template.resources["RoleMonitoringSubscriptionLambda"];
        let statement = &role.properties["Policies"][0]["PolicyDocument"]["Statement"][0];
        assert_eq!(statement["Sid"], POLICY_SID);
        assert_eq!(statement["Action"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn external_distribution_is_passed_verbatim() {
        let mut template = SavedTemplate::default();
        let id = set_realtime_metrics(&mut template, &Input::default(), &Distribution::Id("E2QWRUHAPOMQZL".into()), false).unwrap();
        assert_eq!(template.resources[&id].properties[DISTRIBUTION_ID_KEY], json!("E2QWRUHAPOMQZL"));
        assert!(template.resources["MonitoringSubscriptionLambda"].depends_on.is_empty());
    }

    #[test]
    fn second_distribution_needs_its_own_resource_name() {
        let mut template = SavedTemplate::default();
        set_realtime_metrics(&mut template, &Input::default(), &dist(), true).unwrap();
        let err = set_realtime_metrics(&mut template, &Input::default(), &Distribution::Resource("Other".into()), true).unwrap_err();
        assert!(err.contains("already exists"));
        assert_eq!(template.resources.len(), 4);

        let other = Input { resource_name: "OtherMonitoringLambda".into(), ..Default::default() };
        let id = set_realtime_metrics(&mut template, &other, &Distribution::Resource("Other".into()), true).unwrap();
        assert_eq!(id, "InvokeOtherMonitoringLambda1");
        assert_eq!(template.resources.len(), 8);
        // artifact parameters are shared
        assert_eq!(template.parameters.len(), 2);
    }

    #[test]
    fn invalid_input_is_rejected() {
        let mut template = SavedTemplate::default();
        let bad_memory = Input { memory_size: 64, ..Default::default() };
        assert!(set_realtime_metrics(&mut template, &bad_memory, &dist(), true).unwrap_err().starts_with("Invalid memory size"));
        let bad_retention = Input { log_retention_days: 2, ..Default::default() };
        assert!(set_realtime_metrics(&mut template, &bad_retention, &dist(), true).unwrap_err().starts_with("Invalid log retention"));
        let bad_name = Input { resource_name: "my_lambda".into(), ..Default::default() };
        assert!(set_realtime_metrics(&mut template, &bad_name, &dist(), true).is_err());
        assert!(set_realtime_metrics(&mut template, &Input::default(), &Distribution::Id("".into()), true).is_err());
        assert!(template.resources.is_empty());
    }

    #[test]
    fn function_name_is_optional() {
        let mut template = SavedTemplate::default();
        let named = Input { function_name: "realtime-metrics".into(), ..Default::default() };
        set_realtime_metrics(&mut template, &named, &dist(), true).unwrap();
        assert_eq!(template.resources["MonitoringSubscriptionLambda"].properties["FunctionName"], "realtime-metrics");
    }
}
