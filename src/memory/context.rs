//! Budgeted rendering of recalled facts and turns into a prompt block.
//!
//! Pure functions only; the orchestrator fetches the data and passes it in.

use super::types::{ConversationTurn, FactCategory, MemoryFact};

const USER_FACTS_HEADER: &str = "Things you know about this user:";
const CONVERSATION_FACTS_HEADER: &str = "Previous topics and things you discussed:";
const SNIPPETS_HEADER: &str = "Recent conversation snippets:";

/// Size limits for [`assemble_context`], in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    pub max_chars: usize,
    pub snippet_chars: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_chars: 2400,
            snippet_chars: 100,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    UserFacts,
    ConversationFacts,
    Snippets,
}

impl Section {
    fn header(self) -> &'static str {
        match self {
            Self::UserFacts => USER_FACTS_HEADER,
            Self::ConversationFacts => CONVERSATION_FACTS_HEADER,
            Self::Snippets => SNIPPETS_HEADER,
        }
    }
}

/// Greedy admission against a character budget. Sections are joined by a
/// blank line, so opening one costs its header line plus a separator.
struct Packer {
    budget: usize,
    used: usize,
    open: Vec<Section>,
    full: bool,
}

impl Packer {
    fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            open: Vec::new(),
            full: false,
        }
    }

    /// Reserve room for `text` (one line, newline included) in `section`.
    fn admit(&mut self, section: Section, text: &str) -> bool {
        if self.full {
            return false;
        }
        let mut cost = text.chars().count() + 1;
        if !self.open.contains(&section) {
            cost += section.header().chars().count() + 1;
            if !self.open.is_empty() {
                cost += 1;
            }
        }
        if self.used + cost > self.budget {
            // stop here so the admitted prefix has no gaps
            self.full = true;
            return false;
        }
        if !self.open.contains(&section) {
            self.open.push(section);
        }
        self.used += cost;
        true
    }

    fn reset_full(&mut self) {
        self.full = false;
    }
}

/// Render `facts` (already ranked, most important first) and `turns` (most
/// recent first) into a context block no longer than `budget.max_chars`.
///
/// Facts are admitted until the next one would overflow, then snippets the
/// same way. Returns an empty string when nothing is admitted.
///
/// Admitted facts print under one header per category, so ranking holds
/// within a section only: a conversation fact of importance 9 still follows
/// every admitted user fact.
pub fn assemble_context(
    facts: &[MemoryFact],
    turns: &[ConversationTurn],
    budget: &ContextBudget,
) -> String {
    let mut packer = Packer::new(budget.max_chars);
    let mut user_lines = Vec::new();
    let mut convo_lines = Vec::new();
    let mut snippet_lines = Vec::new();

    for fact in facts {
        let line = format!("- {}: {}", fact.key, fact.value);
        let section = match fact.category {
            FactCategory::User => Section::UserFacts,
            FactCategory::Conversation => Section::ConversationFacts,
        };
        if !packer.admit(section, &line) {
            break;
        }
        match section {
            Section::UserFacts => user_lines.push(line),
            _ => convo_lines.push(line),
        }
    }

    // A dropped fact does not starve the snippets of the room that is left.
    packer.reset_full();

    for turn in turns {
        let user = format!("User: {}", truncate(&turn.input, budget.snippet_chars));
        let you = format!("You: {}", truncate(&turn.response, budget.snippet_chars));
        // both lines of a turn go in together or not at all
        let pair = format!("{user}\n{you}");
        if !packer.admit(Section::Snippets, &pair) {
            break;
        }
        snippet_lines.push(pair);
    }

    let mut sections = Vec::new();
    for (section, lines) in [
        (Section::UserFacts, &user_lines),
        (Section::ConversationFacts, &convo_lines),
        (Section::Snippets, &snippet_lines),
    ] {
        if lines.is_empty() {
            continue;
        }
        let mut block = String::from(section.header());
        block.push('\n');
        for line in lines {
            block.push_str(line);
            block.push('\n');
        }
        sections.push(block);
    }
    sections.join("\n")
}

/// Cut `text` to at most `max` characters, marking the cut with `...`.
fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(&"..."[..max.min(3)]);
    out
}

/// Human-readable overview of everything known about a user, grouped by importance.
pub fn memory_summary(facts: &[MemoryFact]) -> String {
    if facts.is_empty() {
        return "I don't know much about you yet. Chat with me more so I can learn!".into();
    }

    let groups: [(&str, Vec<&MemoryFact>); 3] = [
        ("Important", facts.iter().filter(|f| f.importance >= 8).collect()),
        (
            "Preferences & Details",
            facts
                .iter()
                .filter(|f| (5..8).contains(&f.importance))
                .collect(),
        ),
        ("Other Details", facts.iter().filter(|f| f.importance < 5).collect()),
    ];

    let mut out = String::from("Here's what I know about you:\n");
    for (title, group) in groups.iter() {
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{title}:\n"));
        for fact in group {
            out.push_str(&format!("  • {}: {}\n", fact.key, fact.value));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::TurnStatus;

    fn fact(key: &str, value: &str, importance: u8) -> MemoryFact {
        MemoryFact {
            id: 0,
            user_id: "alex".into(),
            category: FactCategory::User,
            key: key.into(),
            value: value.into(),
            importance,
            created_at: String::new(),
            updated_at: String::new(),
            last_accessed: None,
            access_count: 0,
        }
    }

    fn turn(input: &str, response: &str) -> ConversationTurn {
        ConversationTurn {
            id: 0,
            user_id: "alex".into(),
            input: input.into(),
            response: response.into(),
            timestamp: String::new(),
            context: serde_json::Value::Null,
            status: TurnStatus::Complete,
        }
    }

    #[test]
    fn empty_inputs_give_empty_context() {
        assert_eq!(assemble_context(&[], &[], &ContextBudget::default()), "");
    }

    #[test]
    fn renders_sections_in_order() {
        let mut topic = fact("ai_explained_openings", "Italian game", 6);
        topic.category = FactCategory::Conversation;
        let out = assemble_context(
            &[fact("name", "Alex", 10), topic],
            &[turn("hi", "hello")],
            &ContextBudget::default(),
        );
        let user_at = out.find(USER_FACTS_HEADER).unwrap();
        let convo_at = out.find(CONVERSATION_FACTS_HEADER).unwrap();
        let snip_at = out.find(SNIPPETS_HEADER).unwrap();
        assert!(user_at < convo_at && convo_at < snip_at);
        assert!(out.contains("- name: Alex\n"));
        assert!(out.contains("User: hi\nYou: hello\n"));
    }

    #[test]
    fn snippets_are_truncated() {
        let long = "x".repeat(500);
        let budget = ContextBudget {
            max_chars: 10_000,
            snippet_chars: 20,
        };
        let out = assemble_context(&[], &[turn(&long, &long)], &budget);
        let user_line = out.lines().find(|l| l.starts_with("User: ")).unwrap();
        assert_eq!(user_line.chars().count(), "User: ".len() + 20);
        assert!(user_line.ends_with("..."));
    }

    #[test]
    fn low_importance_tail_is_dropped() {
        let facts = vec![
            fact("name", "Alex", 10),
            fact("job", "librarian", 7),
            fact("snack", "a very long description of a favourite snack", 2),
        ];
        // room for the header and the first two lines only
        let max = USER_FACTS_HEADER.len() + 1 + "- name: Alex\n".len() + "- job: librarian\n".len();
        let budget = ContextBudget {
            max_chars: max,
            snippet_chars: 100,
        };
        let out = assemble_context(&facts, &[], &budget);
        assert!(out.contains("name: Alex"));
        assert!(out.contains("job: librarian"));
        assert!(!out.contains("snack"));
        assert!(out.chars().count() <= max);
    }

    #[test]
    fn never_exceeds_budget() {
        let facts: Vec<_> = (0..30)
            .map(|i| fact(&format!("key_{i}"), &"é".repeat(i), (10 - i % 10) as u8))
            .collect();
        let turns: Vec<_> = (0..10).map(|i| turn(&"q".repeat(i * 20), "answer")).collect();
        for max in [0, 1, 10, 40, 100, 333, 1000, 5000] {
            let budget = ContextBudget {
                max_chars: max,
                snippet_chars: 50,
            };
            let out = assemble_context(&facts, &turns, &budget);
            assert!(out.chars().count() <= max, "budget {max} exceeded: {}", out.chars().count());
        }
    }

    #[test]
    fn summary_groups_by_importance() {
        let summary = memory_summary(&[
            fact("name", "Alex", 10),
            fact("hobby", "chess", 6),
            fact("snack", "crisps", 2),
        ]);
        let important = summary.find("Important:").unwrap();
        let details = summary.find("Preferences & Details:").unwrap();
        let other = summary.find("Other Details:").unwrap();
        assert!(important < details && details < other);
        assert!(summary.contains("• hobby: chess"));
    }

    #[test]
    fn summary_for_nobody() {
        assert!(memory_summary(&[]).contains("don't know much"));
    }
}
