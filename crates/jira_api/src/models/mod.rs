pub mod adf;
mod issue;
mod user;
mod worklog;

pub use issue::{Issue, IssueFields, IssueRaw, NamedField, ProjectRef, SearchResponse};
pub use user::JiraUser;
pub use worklog::{WorklogAuthor, WorklogCreated, WorklogEntry, WorklogPage, JIRA_DATETIME_FORMAT};
