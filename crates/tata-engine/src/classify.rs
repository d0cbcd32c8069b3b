//! Thinking classification: which reasoning fragments are worth surfacing, and how
//! to shorten them for display.
//!
//! The heuristics match natural-language phrases and are tied to the agent's
//! output language. They live behind [`ThinkingClassifier`] so the reducer never
//! depends on them directly.

use regex::Regex;
use std::sync::LazyLock;

use crate::conversation::StepLabel;

/// A reasoning fragment chosen for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surfaced {
    pub content: String,
    pub label: StepLabel,
}

/// Decides which thinking and narration events become thinking steps
pub trait ThinkingClassifier: Send + Sync {
    /// Classify a `thinking` event. `None` means the fragment is not shown.
    fn classify_thinking(&self, content: &str) -> Option<Surfaced>;

    /// Shorten an `assistant_message` note and pick its label
    fn classify_note(&self, content: &str) -> Surfaced;
}

static DECIDE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:决定|decided to )(调用|使用|call|use)\s?(.{1,20})").unwrap()
});

static SELECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(选择|执行|select(?:ing|ed)?|execut(?:ing|ed|e))(?:.*?)(工具|tool)(.{1,15})")
        .unwrap()
});

static CALL_TOOL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:工具|[Tt]ool): ([^)]+)").unwrap());

static TOOL_COMPLETE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:工具|[Tt]ool) (\S+) (?:执行完成|completed)").unwrap());

static REQUEST_ANALYSIS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"用户希望.*?为了帮助用户|(?i:the user wants.*?to help the user)").unwrap()
});

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn take_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    let lower = haystack.to_lowercase();
    needles
        .iter()
        .any(|n| !n.is_empty() && lower.contains(&n.to_lowercase()))
}

/// Phrase-matching classifier for the planning agent's output.
///
/// Every list is public so callers can tune the heuristics for a different agent
/// without replacing the classifier.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    /// A thinking fragment must mention one of these to be surfaced
    pub decision_phrases: Vec<String>,
    /// Fragments mentioning any of these are dropped
    pub filler_phrases: Vec<String>,
    /// Fragments must be longer than this (in characters)
    pub min_chars: usize,
    /// Display length of a surfaced thinking fragment
    pub thinking_max_chars: usize,
    /// Removed (first occurrence each) from surfaced thinking fragments
    pub thinking_noise: Vec<String>,
    /// Marks a note as announcing a tool invocation
    pub invoke_markers: Vec<String>,
    /// Marks a note as reporting a finished tool
    pub complete_markers: Vec<String>,
    /// Display length of a narration note
    pub note_max_chars: usize,
    /// Removed (every occurrence) from narration notes
    pub note_noise: Vec<String>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            decision_phrases: strings(&[
                "决定调用",
                "决定使用",
                "选择工具",
                "执行工具",
                "decided to call",
                "decided to use",
                "selecting tool",
                "executing tool",
            ]),
            filler_phrases: strings(&[
                "正在初始化",
                "继续分析",
                "让我思考",
                "现在我来",
                "initializing",
                "continuing analysis",
                "let me think",
            ]),
            min_chars: 15,
            thinking_max_chars: 25,
            thinking_noise: strings(&["工具来", "功能", "进行"]),
            invoke_markers: strings(&["决定执行", "decided to execute"]),
            complete_markers: strings(&["执行完成", "completed"]),
            note_max_chars: 40,
            note_noise: strings(&["我决定执行: ", "现在我将", "接下来", "I decided to execute: "]),
        }
    }
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_decision_relevant(&self, content: &str) -> bool {
        contains_any(content, &self.decision_phrases)
            && char_len(content) > self.min_chars
            && !contains_any(content, &self.filler_phrases)
    }

    fn extract_decision(&self, content: &str) -> Option<String> {
        if let Some(caps) = DECIDE_PATTERN.captures(content) {
            let verb = &caps[1];
            let rest = &caps[2];
            return Some(if verb.is_ascii() {
                format!("{} {}", verb, rest)
            } else {
                format!("{}{}", verb, rest)
            });
        }

        if !content.contains("工具") && !content.to_lowercase().contains("tool") {
            return None;
        }
        match SELECT_PATTERN.captures(content) {
            Some(caps) if caps[1].is_ascii() => {
                Some(format!("{} tool{}", &caps[1], &caps[3]))
            }
            Some(caps) => Some(format!("{}工具{}", &caps[1], &caps[3])),
            None => Some(content.to_string()),
        }
    }
}

impl ThinkingClassifier for KeywordClassifier {
    fn classify_thinking(&self, content: &str) -> Option<Surfaced> {
        if !self.is_decision_relevant(content) {
            return None;
        }
        let mut text = self.extract_decision(content)?;
        for noise in &self.thinking_noise {
            text = text.replacen(noise.as_str(), "", 1);
        }
        let mut text = take_chars(&text, self.thinking_max_chars);
        if char_len(content) > self.thinking_max_chars {
            text.push_str("...");
        }
        Some(Surfaced {
            content: text,
            label: StepLabel::ToolSelection,
        })
    }

    fn classify_note(&self, content: &str) -> Surfaced {
        let invokes = contains_any(content, &self.invoke_markers);
        let completes = contains_any(content, &self.complete_markers);
        let mentions_tool = content.contains("工具") || content.to_lowercase().contains("tool");

        let text = if invokes && content.contains("call_tool") {
            match CALL_TOOL_PATTERN.captures(content) {
                Some(caps) => format!("call {}", caps[1].trim()),
                None => "call tool".to_string(),
            }
        } else if mentions_tool && completes {
            match TOOL_COMPLETE_PATTERN.captures(content) {
                Some(caps) => format!("{} completed", &caps[1]),
                None => "tool completed".to_string(),
            }
        } else {
            let mut text = REQUEST_ANALYSIS_PATTERN
                .replace_all(content, "analysing request")
                .into_owned();
            for noise in &self.note_noise {
                text = text.replace(noise.as_str(), "");
            }
            let mut text = take_chars(&text, self.note_max_chars);
            if char_len(content) > self.note_max_chars {
                text.push_str("...");
            }
            text
        };

        let label = if invokes {
            StepLabel::ToolInvocation
        } else if completes {
            StepLabel::ExecutionComplete
        } else {
            StepLabel::Analysis
        };

        Surfaced {
            content: text,
            label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::default()
    }

    #[test]
    fn test_decision_is_extracted_and_truncated() {
        let out = classifier()
            .classify_thinking("经过分析，我决定调用航班搜索工具来查找从北京到上海的航班")
            .unwrap();
        assert_eq!(out.content, "调用航班搜索查找从北京到上海的航班...");
        assert_eq!(out.label, StepLabel::ToolSelection);
    }

    #[test]
    fn test_english_decision() {
        let out = classifier()
            .classify_thinking("Decided to use hotel_search now")
            .unwrap();
        assert_eq!(out.content, "use hotel_search now...");
    }

    #[test]
    fn test_short_fragment_is_dropped() {
        assert!(classifier().classify_thinking("决定调用工具").is_none());
    }

    #[test]
    fn test_filler_is_dropped() {
        assert!(
            classifier()
                .classify_thinking("让我思考一下，我决定调用酒店搜索工具看看价格")
                .is_none()
        );
    }

    #[test]
    fn test_irrelevant_fragment_is_dropped() {
        assert!(
            classifier()
                .classify_thinking("The weather in Hangzhou is mild in October")
                .is_none()
        );
    }

    #[test]
    fn test_selection_without_decide_phrase() {
        let out = classifier()
            .classify_thinking("现在选择工具：景点推荐，获取杭州的热门景点")
            .unwrap();
        assert_eq!(out.content, "选择工具：景点推荐，获取杭州的热门景点");
    }

    #[test]
    fn test_note_call_tool() {
        let out = classifier().classify_note("我决定执行: call_tool (工具: weather_query)");
        assert_eq!(out.content, "call weather_query");
        assert_eq!(out.label, StepLabel::ToolInvocation);
    }

    #[test]
    fn test_note_tool_complete() {
        let out = classifier().classify_note("工具 flight_search 执行完成，共找到 3 个航班");
        assert_eq!(out.content, "flight_search completed");
        assert_eq!(out.label, StepLabel::ExecutionComplete);
    }

    #[test]
    fn test_note_analysis_is_shortened() {
        let out = classifier()
            .classify_note("用户希望去杭州玩三天，为了帮助用户，接下来我会先查询天气");
        assert_eq!(out.content, "analysing request，我会先查询天气");
        assert_eq!(out.label, StepLabel::Analysis);
    }

    #[test]
    fn test_note_short_text_unchanged() {
        let out = classifier().classify_note("Checking availability");
        assert_eq!(out.content, "Checking availability");
        assert_eq!(out.label, StepLabel::Analysis);
    }
}
