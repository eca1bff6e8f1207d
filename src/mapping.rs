//! Stateless translation between provider vocabularies and the normalized
//! state and type enums. Unknown inputs fall back to `Open` / `Issue`.

use crate::model::{IssueState, IssueType};

/// Map a provider state string (GitHub or Azure DevOps, any case).
pub fn map_state(provider_state: &str) -> IssueState {
    match provider_state.trim().to_ascii_lowercase().as_str() {
        "open" | "new" | "to do" | "todo" | "proposed" | "approved" => IssueState::Open,
        "active" | "committed" | "in progress" | "in_progress" | "doing" => {
            IssueState::InProgress
        }
        "resolved" | "in review" | "in_review" | "review" => IssueState::InReview,
        "closed" | "done" | "completed" => IssueState::Closed,
        "removed" | "cancelled" | "canceled" | "not_planned" => IssueState::Cancelled,
        _ => IssueState::Open,
    }
}

/// Map a provider type string (Azure work item type or a GitHub label).
pub fn map_type(provider_type: &str) -> IssueType {
    match provider_type.trim().to_ascii_lowercase().as_str() {
        "bug" | "defect" => IssueType::Bug,
        "task" => IssueType::Task,
        "epic" => IssueType::Epic,
        "feature" | "enhancement" => IssueType::Feature,
        _ => IssueType::Issue,
    }
}

/// Azure states that cannot be started or closed again.
pub fn is_terminal_provider_state(provider_state: &str) -> bool {
    matches!(
        provider_state.trim().to_ascii_lowercase().as_str(),
        "done" | "closed" | "removed"
    )
}

/// Azure state written when an item of `work_item_type` is closed.
pub fn azure_closed_state(work_item_type: &str) -> &'static str {
    if work_item_type.eq_ignore_ascii_case("Product Backlog Item") {
        "Done"
    } else {
        "Closed"
    }
}

/// Azure state written when work starts on an item of `work_item_type`.
pub fn azure_active_state(work_item_type: &str) -> &'static str {
    if work_item_type.eq_ignore_ascii_case("Product Backlog Item") {
        "Committed"
    } else {
        "Active"
    }
}

/// Trailing numeric id of a `.../workItems/<n>` relation url.
pub fn extract_id_from_relation_url(url: &str) -> Option<u64> {
    let mut segments = url.trim().trim_end_matches('/').rsplit('/');
    let id = segments.next()?;
    let collection = segments.next()?;
    if !collection.eq_ignore_ascii_case("workitems") {
        return None;
    }
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azure_states() {
        assert_eq!(map_state("New"), IssueState::Open);
        assert_eq!(map_state("Active"), IssueState::InProgress);
        assert_eq!(map_state("Committed"), IssueState::InProgress);
        assert_eq!(map_state("In Progress"), IssueState::InProgress);
        assert_eq!(map_state("Resolved"), IssueState::InReview);
        assert_eq!(map_state("Closed"), IssueState::Closed);
        assert_eq!(map_state("Done"), IssueState::Closed);
        assert_eq!(map_state("Removed"), IssueState::Cancelled);
    }

    #[test]
    fn test_github_states_any_case() {
        assert_eq!(map_state("OPEN"), IssueState::Open);
        assert_eq!(map_state("closed"), IssueState::Closed);
        assert_eq!(map_state("NOT_PLANNED"), IssueState::Cancelled);
    }

    #[test]
    fn test_unknown_state_defaults_to_open() {
        for input in ["", "Frozen", "  ", "awaiting triage", "🚧"] {
            assert_eq!(map_state(input), IssueState::Open, "input {input:?}");
        }
    }

    #[test]
    fn test_types() {
        assert_eq!(map_type("Bug"), IssueType::Bug);
        assert_eq!(map_type("Task"), IssueType::Task);
        assert_eq!(map_type("Epic"), IssueType::Epic);
        assert_eq!(map_type("Feature"), IssueType::Feature);
        assert_eq!(map_type("enhancement"), IssueType::Feature);
        assert_eq!(map_type("User Story"), IssueType::Issue);
        assert_eq!(map_type("Product Backlog Item"), IssueType::Issue);
        assert_eq!(map_type("Test Case"), IssueType::Issue);
    }

    #[test]
    fn test_target_states_map_back() {
        for work_item_type in ["User Story", "Task", "Bug", "Product Backlog Item"] {
            assert_eq!(map_state(azure_closed_state(work_item_type)), IssueState::Closed);
            assert_eq!(
                map_state(azure_active_state(work_item_type)),
                IssueState::InProgress
            );
        }
    }

    #[test]
    fn test_terminal_provider_states() {
        assert!(is_terminal_provider_state("Done"));
        assert!(is_terminal_provider_state("closed"));
        assert!(is_terminal_provider_state("Removed"));
        assert!(!is_terminal_provider_state("Resolved"));
        assert!(!is_terminal_provider_state("Active"));
    }

    #[test]
    fn test_process_specific_target_states() {
        assert_eq!(azure_closed_state("Product Backlog Item"), "Done");
        assert_eq!(azure_closed_state("User Story"), "Closed");
        assert_eq!(azure_active_state("Product Backlog Item"), "Committed");
        assert_eq!(azure_active_state("Task"), "Active");
    }

    #[test]
    fn test_extract_id_from_relation_url() {
        let url = "https://dev.azure.com/acme/_apis/wit/workItems/4521";
        assert_eq!(extract_id_from_relation_url(url), Some(4521));
        assert_eq!(extract_id_from_relation_url(url), Some(4521));
        assert_eq!(
            extract_id_from_relation_url("https://dev.azure.com/acme/_apis/wit/workitems/9/"),
            Some(9)
        );
    }

    #[test]
    fn test_extract_id_rejects_other_strings() {
        for input in [
            "",
            "https://dev.azure.com/acme/_apis/wit/workItems/",
            "https://dev.azure.com/acme/_apis/wit/workItems/12a",
            "https://dev.azure.com/acme/_apis/git/repositories/12",
            "https://dev.azure.com/acme/_apis/wit/workItems/-3",
            "not a url at all",
        ] {
            assert_eq!(extract_id_from_relation_url(input), None, "input {input:?}");
        }
    }
}
