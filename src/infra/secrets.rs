use std::panic;

const REDACTED: &str = "[REDACTED]";

const SENSITIVE_MARKERS: [&str; 5] = ["password", "secret", "token", "bearer", "authorization"];

/// Query parameters whose values never reach a log line.
const SENSITIVE_PARAMS: [&str; 2] = ["access_token", "token"];

pub fn redact_text(input: &str) -> String {
    input
        .split_whitespace()
        .map(redact_chunk)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replaces the values of credential query parameters in `url`.
pub fn redact_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_owned();
    };

    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if SENSITIVE_PARAMS.contains(&name.to_ascii_lowercase().as_str()) => {
                format!("{name}={REDACTED}")
            }
            _ => pair.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{base}?{query}")
}

pub fn install_panic_redaction_hook() {
    panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic payload omitted".to_owned());

        let scrubbed = redact_text(&payload);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "inbox-sync panic: {} at {}:{}:{}",
                scrubbed,
                location.file(),
                location.line(),
                location.column()
            );
        } else {
            eprintln!("inbox-sync panic: {}", scrubbed);
        }
    }));
}

fn redact_chunk(chunk: &str) -> String {
    if chunk.contains("://") {
        return redact_url(chunk);
    }

    let lowered = chunk.to_ascii_lowercase();
    if SENSITIVE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
        || looks_like_jwt(chunk)
    {
        REDACTED.to_owned()
    } else {
        chunk.to_owned()
    }
}

fn looks_like_jwt(value: &str) -> bool {
    let cleaned = value.trim_matches(|ch: char| ch == '"' || ch == '\'' || ch == ',');
    let segments: Vec<&str> = cleaned.split('.').collect();

    segments.len() == 3
        && cleaned.starts_with("eyJ")
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_text_scrubs_sensitive_fragments() {
        let input = "auth failed token=abc123 with eyJhbGci.eyJzdWIi.c2lnbmF0dXJl for agent-1";
        let output = redact_text(input);

        assert!(!output.contains("abc123"));
        assert!(!output.contains("eyJzdWIi"));
        assert!(output.contains("agent-1"));
        assert!(output.contains("[REDACTED]"));
    }

    #[test]
    fn redact_url_hides_access_token_only() {
        let url = "wss://desk.example.com/hubs/chat?id=7&access_token=eyJ.abc.def";

        assert_eq!(
            redact_url(url),
            "wss://desk.example.com/hubs/chat?id=7&access_token=[REDACTED]"
        );
        assert_eq!(redact_url("https://desk.example.com/api"), "https://desk.example.com/api");
    }

    #[test]
    fn urls_inside_text_are_redacted() {
        let output = redact_text("connect to wss://h/hub?access_token=s3cr3t failed");

        assert_eq!(output, "connect to wss://h/hub?access_token=[REDACTED] failed");
    }
}
