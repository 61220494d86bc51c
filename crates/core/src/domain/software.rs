use serde::{Deserialize, Serialize};

/// Catalog shipped when no `software.approved` list is configured.
pub const DEFAULT_APPROVED_SOFTWARE: &[&str] = &[
    "7-Zip",
    "Adobe Acrobat Reader",
    "Google Chrome",
    "Microsoft Teams",
    "Mozilla Firefox",
    "Notepad++",
    "Slack",
    "VLC Media Player",
    "Visual Studio Code",
    "Zoom",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftwareVerdict {
    Approved { canonical: String, message: String },
    Rejected { message: String },
}

/// Static set of software that may be deployed. Lookups are case-insensitive and
/// exact; the listing keeps the configured order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoftwareRegistry {
    approved: Vec<String>,
}

impl Default for SoftwareRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_APPROVED_SOFTWARE.iter().map(|name| name.to_string()))
    }
}

impl SoftwareRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut approved: Vec<String> = Vec::new();
        for name in names {
            let name = name.into().trim().to_string();
            if name.is_empty() || approved.iter().any(|known| known.eq_ignore_ascii_case(&name)) {
                continue;
            }
            approved.push(name);
        }
        Self { approved }
    }

    pub fn is_approved(&self, name: &str) -> bool {
        self.canonical(name).is_some()
    }

    pub fn canonical(&self, name: &str) -> Option<&str> {
        let needle = name.trim().to_lowercase();
        self.approved.iter().find(|known| known.to_lowercase() == needle).map(String::as_str)
    }

    pub fn list_approved(&self) -> &[String] {
        &self.approved
    }

    pub fn listing(&self) -> String {
        self.approved.join(", ")
    }

    pub fn verify(&self, name: &str) -> SoftwareVerdict {
        match self.canonical(name) {
            Some(canonical) => SoftwareVerdict::Approved {
                canonical: canonical.to_string(),
                message: format!("Software '{name}' is available for deployment."),
            },
            None => SoftwareVerdict::Rejected {
                message: format!(
                    "Software '{name}' is not an approved software. Please choose from: {}.",
                    self.listing()
                ),
            },
        }
    }
}
