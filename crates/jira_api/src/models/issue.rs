use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<IssueRaw>,
}

#[derive(Debug, Deserialize)]
pub struct IssueRaw {
    pub key: String,
    pub fields: IssueFields,
}

#[derive(Debug, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
    pub status: Option<NamedField>,
    pub issuetype: Option<NamedField>,
    pub project: Option<ProjectRef>,
}

#[derive(Debug, Deserialize)]
pub struct NamedField {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ProjectRef {
    pub key: String,
}

/// Flattened issue row handed to callers of JQL search.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Issue {
    pub key: String,
    pub summary: String,
    pub project_key: String,
    pub status: Option<String>,
    pub issue_type: Option<String>,
}

impl From<IssueRaw> for Issue {
    fn from(raw: IssueRaw) -> Self {
        Self {
            key: raw.key,
            summary: raw.fields.summary,
            project_key: raw.fields.project.map(|p| p.key).unwrap_or_default(),
            status: raw.fields.status.map(|s| s.name),
            issue_type: raw.fields.issuetype.map(|t| t.name),
        }
    }
}
