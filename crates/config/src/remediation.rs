use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Output flavor for generated remediation roles.
///
/// Each flavor maps to the engine's fix template identifier and the file
/// extension the role is conventionally saved under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    Bash,
    Ansible,
    Puppet,
}

const FIX_TABLE: &[(FixType, &str, &str)] = &[
    (FixType::Bash, "urn:xccdf:fix:script:sh", "sh"),
    (FixType::Ansible, "urn:xccdf:fix:script:ansible", "yml"),
    (FixType::Puppet, "urn:xccdf:fix:script:puppet", "pp"),
];

impl FixType {
    /// Template identifier understood by `xccdf generate fix`.
    pub fn template(self) -> &'static str {
        FIX_TABLE
            .iter()
            .find(|(fix, _, _)| *fix == self)
            .map(|(_, template, _)| *template)
            .unwrap_or_default()
    }

    /// Conventional file extension for the generated role.
    pub fn extension(self) -> &'static str {
        FIX_TABLE
            .iter()
            .find(|(fix, _, _)| *fix == self)
            .map(|(_, _, ext)| *ext)
            .unwrap_or_default()
    }

    /// Argument vector for generating a remediation role from scan
    /// results, relative to the engine binary.
    pub fn generate_fix_args(
        self,
        profile_id: Option<&str>,
        output_path: &str,
        input_path: &str,
    ) -> Vec<String> {
        let mut args = vec![
            "xccdf".to_string(),
            "generate".to_string(),
            "fix".to_string(),
            "--template".to_string(),
            self.template().to_string(),
        ];
        if let Some(profile) = profile_id {
            args.push("--profile".to_string());
            args.push(profile.to_string());
        }
        args.push("--output".to_string());
        args.push(output_path.to_string());
        args.push(input_path.to_string());
        args
    }
}

impl FromStr for FixType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bash" => Ok(FixType::Bash),
            "ansible" => Ok(FixType::Ansible),
            "puppet" => Ok(FixType::Puppet),
            other => Err(crate::Error::InvalidFixType(other.to_string())),
        }
    }
}
