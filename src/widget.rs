//! Embeddable widget snippet generation.
//!
//! External sites embed the chatbot by pasting a generated script tag (with
//! an iframe fallback) parameterized by chatbot id and owner id, pointed at
//! the configured widget domain.

use uuid::Uuid;

fn widget_origin(domain: &str) -> String {
    // Local development runs the widget over plain http
    if domain.starts_with("localhost") || domain.starts_with("127.") {
        format!("http://{}", domain)
    } else {
        format!("https://{}", domain)
    }
}

/// Render the embed snippet for one chatbot.
pub fn embed_snippet(chatbot_id: Uuid, owner_id: Uuid, domain: &str) -> String {
    let origin = widget_origin(domain);
    format!(
        concat!(
            "<script src=\"{origin}/widget.js\" data-chatbot-id=\"{chatbot}\" ",
            "data-owner-id=\"{owner}\" defer></script>\n",
            "<noscript>\n",
            "  <iframe src=\"{origin}/widget?chatbot={chatbot}&owner={owner}\" ",
            "title=\"Support chat\" width=\"380\" height=\"560\" frameborder=\"0\"></iframe>\n",
            "</noscript>"
        ),
        origin = origin,
        chatbot = chatbot_id,
        owner = owner_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_carries_both_ids() {
        let chatbot_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        let snippet = embed_snippet(chatbot_id, owner_id, "localhost:3001");

        assert!(snippet.contains(&chatbot_id.to_string()));
        assert!(snippet.contains(&owner_id.to_string()));
        assert!(snippet.contains("http://localhost:3001/widget.js"));
        assert!(snippet.contains("<iframe"));
    }

    #[test]
    fn non_local_domains_use_https() {
        let snippet = embed_snippet(Uuid::new_v4(), Uuid::new_v4(), "widget.example.com");
        assert!(snippet.contains("https://widget.example.com/widget.js"));
        assert!(!snippet.contains("http://widget.example.com"));
    }
}
