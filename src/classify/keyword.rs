//! Deterministic keyword classification.
//!
//! Rules are an ordered list; the list order is the ranking policy. A record
//! goes to the first rule with any keyword contained in its classification
//! text (see [`EnrichedRecord::classification_text`]), or to "Other".

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::classify::{Classifier, OTHER_CATEGORY};
use crate::error::PipelineError;
use crate::models::{ClassifiedRecord, EnrichedRecord};

/// One prioritized `(category, keywords)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(category: &str, keywords: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// The built-in rule table, in priority order.
pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new(
            "Data Visualization & Dashboards",
            &[
                "dashboard", "monitor", "geopolitical", "budget", "visualize", "map",
                "citi bike", "stock", "portfolio", "13f", "yacht", "tco", "analytics",
                "charts", "plotting", "d3", "grafana", "kibana", "graph", "visualization",
            ],
        ),
        KeywordRule::new(
            "Education & Philosophy",
            &[
                "philosophy", "course", "learn", "education", "research", "academy",
                "tutorial", "documentation", "book", "reading", "school", "university",
                "history",
            ],
        ),
        KeywordRule::new(
            "Games & Entertainment",
            &[
                "game", "minesweeper", "geoguess", "word search", "mario party", "robot",
                "piano", "musical", "ear training", "tiktok", "wikipedia", "rocket",
                "simulator", "batte", "music", "video", "stream", "audio", "puzzle", "rpg",
                "fps", "unity", "unreal",
            ],
        ),
        KeywordRule::new(
            "Productivity & Browser Extensions",
            &[
                "chrome extension", "saas tracker", "subscription", "browser history",
                "new tab", "spreadsheet", "usage tracker", "calendar", "todo", "notes",
                "productivity", "organizer", "automation", "slack", "discord", "email", "crm",
            ],
        ),
        KeywordRule::new(
            "Web3 & Blockchain",
            &[
                "blockchain", "equity", "solana", "tokenized", "securities", "auction",
                "crypto", "nft", "ethereum", "bitcoin", "web3", "dao", "defi",
            ],
        ),
        KeywordRule::new(
            "Design & Creative Tools",
            &[
                "design", "figma", "svg", "canvas", "image editor", "photo", "icon", "font",
                "css", "tailwind", "ui", "ux", "animation", "3d", "modeling",
            ],
        ),
        KeywordRule::new(
            "Privacy & Security",
            &[
                "privacy", "security", "encryption", "vpn", "firewall", "auth",
                "authentication", "password", "hacking", "osint", "forensics", "audit",
            ],
        ),
        KeywordRule::new(
            "Developer Tools & Frameworks",
            &[
                "github", "debug", "debugger", "terminal", "cli", "programming language",
                "framework", "rust", "zig", "go", "git", "pr", "distributed", "consensus",
                "proxy", "unzip", "text editor", "markdown", "tmux", "api", "backend",
                "frontend", "database", "docker", "kubernetes", "compiler", "interpreter",
                "npm", "pip", "cargo",
            ],
        ),
        KeywordRule::new(
            "AI & LLM Tools",
            &[
                "ai", "llm", "claude", "gpt", "agent", "chatbot", "natural language",
                "video generator", "poker", "machine learning", "deep learning", "openai",
                "anthropic", "stable diffusion", "midjourney", "transformer",
            ],
        ),
    ]
}

/// First-match-wins classifier over an explicit rule list.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
}

impl KeywordClassifier {
    /// Build from `rules`, keeping their order.
    ///
    /// Keywords are trimmed and lowercased. Rules naming "Other" and rules
    /// left without keywords are dropped with a warning.
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter_map(|rule| {
                let category = rule.category.trim().to_string();
                let keywords: Vec<String> = rule
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                if category.is_empty() || category.eq_ignore_ascii_case(OTHER_CATEGORY) {
                    warn!(%category, "Ignoring keyword rule for a reserved or blank category");
                    return None;
                }
                if keywords.is_empty() {
                    warn!(%category, "Ignoring keyword rule without keywords");
                    return None;
                }
                Some(KeywordRule { category, keywords })
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// Category for one record. Pure: same record, same rules, same answer.
    pub fn categorize(&self, record: &EnrichedRecord) -> &str {
        let text = record.classification_text();
        self.rules
            .iter()
            .find(|rule| rule.matches(&text))
            .map(|rule| rule.category.as_str())
            .unwrap_or(OTHER_CATEGORY)
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Classifier for KeywordClassifier {
    #[instrument(level = "info", skip_all, fields(records = records.len(), rules = self.rules.len()))]
    async fn classify(
        &self,
        records: Vec<EnrichedRecord>,
    ) -> Result<Vec<ClassifiedRecord>, PipelineError> {
        let classified: Vec<ClassifiedRecord> = records
            .into_iter()
            .map(|record| {
                let category = self.categorize(&record).to_string();
                record.with_category(category)
            })
            .collect();
        let other = classified
            .iter()
            .filter(|r| r.category == OTHER_CATEGORY)
            .count();
        info!(count = classified.len(), other, "Keyword classification complete");
        Ok(classified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::enriched;

    #[test]
    fn first_matching_rule_wins() {
        let classifier = KeywordClassifier::default();
        // Matches both "dashboard" and "ai"; dashboards come first.
        let record = enriched("1", "Show HN: AI dashboard for bikes", "");
        assert_eq!(classifier.categorize(&record), "Data Visualization & Dashboards");
    }

    #[test]
    fn rule_order_is_the_ranking_policy() {
        let rules = vec![
            KeywordRule::new("Games", &["puzzle"]),
            KeywordRule::new("Education", &["learn"]),
        ];
        let record = enriched("1", "Learn by puzzle", "");
        assert_eq!(KeywordClassifier::new(rules.clone()).categorize(&record), "Games");

        let reversed: Vec<KeywordRule> = rules.into_iter().rev().collect();
        assert_eq!(KeywordClassifier::new(reversed).categorize(&record), "Education");
    }

    #[test]
    fn description_and_case_are_considered() {
        let classifier = KeywordClassifier::new(vec![KeywordRule::new("Privacy", &["VPN"])]);
        let record = enriched("1", "Show HN: Tunnel", "A tiny WireGuard vpn");
        assert_eq!(classifier.categorize(&record), "Privacy");
    }

    #[test]
    fn no_match_falls_back_to_other() {
        let classifier = KeywordClassifier::new(vec![KeywordRule::new("Games", &["puzzle"])]);
        let record = enriched("1", "Show HN: Sourdough timer", "Bread");
        assert_eq!(classifier.categorize(&record), OTHER_CATEGORY);
    }

    #[test]
    fn reserved_and_empty_rules_are_dropped() {
        let classifier = KeywordClassifier::new(vec![
            KeywordRule::new("Other", &["bread"]),
            KeywordRule::new("Empty", &["  "]),
            KeywordRule::new("Food", &["bread"]),
        ]);
        assert_eq!(classifier.rules().len(), 1);
        let record = enriched("1", "Bread maker", "");
        assert_eq!(classifier.categorize(&record), "Food");
    }

    #[test]
    fn categorize_is_deterministic() {
        let classifier = KeywordClassifier::default();
        let record = enriched("1", "Show HN: Rust compiler explorer", "Explore MIR");
        let first = classifier.categorize(&record).to_string();
        for _ in 0..10 {
            assert_eq!(classifier.categorize(&record), first);
        }
    }

    #[tokio::test]
    async fn classify_keeps_input_order_and_assigns_every_record() {
        let classifier = KeywordClassifier::default();
        let records = vec![
            enriched("a", "Show HN: Minesweeper in the terminal", ""),
            enriched("b", "Show HN: Sourdough timer", ""),
        ];
        let classified = classifier.classify(records).await.unwrap();
        assert_eq!(classified.len(), 2);
        assert_eq!(classified[0].listing.id, "a");
        assert_eq!(classified[0].category, "Games & Entertainment");
        assert!(classified.iter().all(|r| !r.category.is_empty()));
    }

    #[test]
    fn rules_deserialize_from_yaml() {
        let yaml = "- category: Games\n  keywords: [puzzle, rpg]\n";
        let rules: Vec<KeywordRule> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules, vec![KeywordRule::new("Games", &["puzzle", "rpg"])]);
    }
}
