use std::path::PathBuf;
use thiserror::Error;

/// The only failure that aborts a product scrape.
///
/// Every other miss (a selector chain exhausted, an image that would not
/// download, a recognition engine that never initialized) is absorbed into
/// the record's optionality and surfaced through tracing. Losing the option
/// panel is different: nothing downstream is meaningful without it, so the
/// caller gets a structured failure plus a page snapshot for selector
/// maintenance.
#[derive(Debug, Error)]
pub enum CollectFailure {
    #[error("could not locate the product's option panel{}", snapshot_suffix(.snapshot))]
    OptionPanelMissing {
        /// Page-source snapshot written for later selector maintenance.
        snapshot: Option<PathBuf>,
    },

    /// The browser session itself broke (navigation failed, CDP connection
    /// dropped). Not a page-shape problem, but equally unrecoverable within
    /// one scrape.
    #[error("browser session failure: {0}")]
    Session(#[from] anyhow::Error),
}

fn snapshot_suffix(snapshot: &Option<PathBuf>) -> String {
    match snapshot {
        Some(p) => format!(" (page snapshot: {})", p.display()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_panel_message_names_the_snapshot() {
        let err = CollectFailure::OptionPanelMissing {
            snapshot: Some(PathBuf::from("out/debug_page_source.html")),
        };
        let msg = err.to_string();
        assert!(msg.contains("option panel"));
        assert!(msg.contains("debug_page_source.html"));
    }

    #[test]
    fn option_panel_message_without_snapshot() {
        let err = CollectFailure::OptionPanelMissing { snapshot: None };
        assert_eq!(err.to_string(), "could not locate the product's option panel");
    }
}
