//! Crawler User-Agent filtering
//!
//! A fixed list of AI crawlers and major search bots. Matching requests are
//! refused before routing and never logged.

use once_cell::sync::Lazy;

static BLOCKED_USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "gptbot",
        "oai-searchbot",
        "chatgpt-user",
        "claudebot",
        "claude-web",
        "anthropic-ai",
        "ccbot",
        "google-extended",
        "googlebot",
        "bingbot",
        "bytespider",
        "perplexitybot",
        "amazonbot",
        "baiduspider",
        "yandexbot",
        "duckduckbot",
        "meta-externalagent",
        "facebookbot",
        "applebot",
    ]
});

/// True when the User-Agent belongs to a blocked crawler.
pub fn is_blocked_user_agent(user_agent: &str) -> bool {
    let user_agent = user_agent.to_lowercase();
    BLOCKED_USER_AGENTS
        .iter()
        .any(|pattern| user_agent.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_ai_crawlers() {
        assert!(is_blocked_user_agent(
            "Mozilla/5.0 AppleWebKit/537.36 (compatible; GPTBot/1.2; +https://openai.com/gptbot)"
        ));
        assert!(is_blocked_user_agent("ClaudeBot/1.0"));
        assert!(is_blocked_user_agent("CCBot/2.0 (https://commoncrawl.org/faq/)"));
    }

    #[test]
    fn blocks_search_bots_case_insensitively() {
        assert!(is_blocked_user_agent(
            "Mozilla/5.0 (compatible; GOOGLEBOT/2.1; +http://www.google.com/bot.html)"
        ));
        assert!(is_blocked_user_agent("bingbot/2.0"));
    }

    #[test]
    fn allows_ordinary_clients() {
        assert!(!is_blocked_user_agent("curl/8.4.0"));
        assert!(!is_blocked_user_agent("python-httpx/0.27"));
        assert!(!is_blocked_user_agent(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) Safari/605.1.15"
        ));
        assert!(!is_blocked_user_agent(""));
    }
}
