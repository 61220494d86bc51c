use deploydesk_core::domain::session::Field;
use deploydesk_core::flows::{Confirmation, DialogueState, TurnEvent};

/// Result of reading one free-text message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedTurn {
    pub event: Option<TurnEvent>,
    pub clarification_prompt: Option<String>,
}

impl ParsedTurn {
    fn event(event: TurnEvent) -> Self {
        Self { event: Some(event), clarification_prompt: None }
    }

    fn clarify(prompt: &str) -> Self {
        Self { event: None, clarification_prompt: Some(prompt.to_string()) }
    }
}

/// Deterministic keyword reader that turns chat text into structured turn
/// events. It never validates anything; values are passed through as typed.
#[derive(Clone, Debug, Default)]
pub struct TurnParser;

const CANCEL_PHRASES: &[&str] =
    &["cancel", "abort", "stop", "quit", "exit", "never mind", "nevermind", "forget it"];
const YES_PHRASES: &[&str] = &[
    "yes", "y", "yep", "yeah", "yup", "sure", "ok", "okay", "correct", "confirm", "confirmed",
    "proceed", "go ahead", "do it", "that's right", "looks good",
];
const NO_PHRASES: &[&str] = &["no", "n", "nope", "nah", "wrong", "incorrect", "not quite"];
const CORRECTION_VERBS: &[&str] = &["change", "correct", "update", "fix", "edit"];
// A leading "yes" followed by one of these is not assent.
const HEDGE_WORDS: &[&str] = &["but", "except", "although", "though", "wait", "however"];
const LIST_PHRASES: &[&str] = &[
    "list",
    "options",
    "catalog",
    "catalogue",
    "what can you install",
    "what software",
    "which software",
    "available software",
    "approved software",
];

const SOFTWARE_PREFIXES: &[&str] = &[
    "software name is",
    "software is",
    "software:",
    "software =",
    "software",
    "i want to install",
    "i'd like to install",
    "please install",
    "install",
];
const COMPUTER_PREFIXES: &[&str] = &[
    "computer name is",
    "computer name:",
    "computer is",
    "computer:",
    "computer name",
    "hostname is",
    "hostname:",
    "hostname",
    "workstation is",
    "workstation:",
    "workstation",
    "machine is",
    "machine:",
];
const USERNAME_PREFIXES: &[&str] = &[
    "my username is",
    "username is",
    "username:",
    "username",
    "user is",
    "user id is",
    "uid is",
    "uid:",
    "user:",
];

impl TurnParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str, state: DialogueState) -> ParsedTurn {
        let trimmed = text.trim();
        let normalized = normalize(trimmed);

        if normalized.is_empty() {
            return ParsedTurn::clarify("I didn't catch that. Could you say it again?");
        }
        if CANCEL_PHRASES.contains(&normalized.as_str()) {
            return ParsedTurn::event(TurnEvent::CancelRequested);
        }
        if state.is_terminal() {
            return ParsedTurn::clarify(
                "This conversation has ended. Start a new one to request another deployment.",
            );
        }
        if let Some(field) = extract_correction(&normalized) {
            return ParsedTurn::event(TurnEvent::CorrectionRequested { field });
        }
        if state == DialogueState::AwaitingConfirmation {
            if let Some(field) = field_named(&normalized) {
                return ParsedTurn::event(TurnEvent::CorrectionRequested { field });
            }
        }
        if let Some(answer) = extract_answer(&normalized, state) {
            return ParsedTurn::event(TurnEvent::ConfirmationProvided { answer });
        }
        if LIST_PHRASES.iter().any(|phrase| is_list_request(&normalized, phrase)) {
            return ParsedTurn::event(TurnEvent::ListRequested);
        }
        if let Some((field, value)) = extract_keyed_fact(trimmed) {
            return ParsedTurn::event(TurnEvent::FactProvided { field, value });
        }

        match state.collected_field() {
            Some(field) => {
                ParsedTurn::event(TurnEvent::FactProvided { field, value: strip_quotes(trimmed) })
            }
            None => ParsedTurn::clarify(
                "Please answer yes to start the deployment, no to change a detail, or tell me \
                 which detail to change.",
            ),
        }
    }
}

fn normalize(text: &str) -> String {
    text.to_ascii_lowercase()
        .trim_end_matches(['.', '!', '?'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Matches a whole-message answer. While a confirmation is open, an answer
/// word leading a longer reply ("yes, go ahead") counts as well, unless the
/// rest of the reply hedges or asks for a change.
fn extract_answer(normalized: &str, state: DialogueState) -> Option<Confirmation> {
    let leading = if state == DialogueState::AwaitingConfirmation {
        normalized.split([',', ' ']).next().unwrap_or_default()
    } else {
        normalized
    };
    if leading != normalized
        && words(normalized).skip(1).any(|word| {
            // "correct" doubles as assent ("yes, that's correct").
            HEDGE_WORDS.contains(&word)
                || (word != "correct" && CORRECTION_VERBS.contains(&word))
        })
    {
        return None;
    }
    if YES_PHRASES.contains(&normalized) || YES_PHRASES.contains(&leading) {
        Some(Confirmation::Yes)
    } else if NO_PHRASES.contains(&normalized) || NO_PHRASES.contains(&leading) {
        Some(Confirmation::No)
    } else {
        None
    }
}

fn is_list_request(normalized: &str, phrase: &str) -> bool {
    if phrase.contains(' ') {
        normalized.contains(phrase)
    } else {
        normalized.split(|c: char| !c.is_ascii_alphanumeric()).any(|word| word == phrase)
    }
}

fn words(normalized: &str) -> impl Iterator<Item = &str> {
    normalized
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'))
        .filter(|word| !word.is_empty())
}

/// Finds "change the computer name", "yes, but fix my username" and the like:
/// a correction verb anywhere, followed by a field word.
fn extract_correction(normalized: &str) -> Option<Field> {
    let tokens: Vec<&str> = words(normalized).collect();
    tokens.iter().enumerate().find_map(|(index, word)| {
        if !CORRECTION_VERBS.contains(word) {
            return None;
        }
        let mut rest = tokens[index + 1..]
            .iter()
            .copied()
            .skip_while(|word| matches!(*word, "the" | "my" | "that" | "this"));
        field_word(rest.next()?)
    })
}

/// A reply that is nothing but a field name ("the computer name", "username").
fn field_named(normalized: &str) -> Option<Field> {
    let bare = ["the ", "my "]
        .iter()
        .find_map(|article| normalized.strip_prefix(article))
        .unwrap_or(normalized);

    match bare {
        "software" | "software name" | "app" | "application" | "program" => Some(Field::Software),
        "computer" | "computer name" | "hostname" | "workstation" | "machine" => {
            Some(Field::Computer)
        }
        "username" | "user name" | "user" | "user id" | "uid" => Some(Field::Username),
        _ => None,
    }
}

fn field_word(word: &str) -> Option<Field> {
    match word {
        "software" | "app" | "application" | "program" => Some(Field::Software),
        "computer" | "hostname" | "workstation" | "machine" => Some(Field::Computer),
        "user" | "username" | "uid" => Some(Field::Username),
        _ => None,
    }
}

fn extract_keyed_fact(text: &str) -> Option<(Field, String)> {
    // ASCII lowercasing keeps byte offsets aligned with the original text.
    let lowered = text.to_ascii_lowercase();
    let candidates = [
        (Field::Software, SOFTWARE_PREFIXES),
        (Field::Computer, COMPUTER_PREFIXES),
        (Field::Username, USERNAME_PREFIXES),
    ];

    for (field, prefixes) in candidates {
        for prefix in prefixes {
            if !lowered.starts_with(prefix) {
                continue;
            }
            let rest = &text[prefix.len()..];
            // "software" must be followed by a separator, not "softwarex".
            if !prefix.ends_with([':', '=', ' ']) && !rest.starts_with([' ', ':', '=']) {
                continue;
            }
            let value = strip_quotes(rest.trim_start_matches([' ', ':', '=']));
            if !value.is_empty() {
                return Some((field, value));
            }
        }
    }
    None
}

fn strip_quotes(value: &str) -> String {
    value.trim().trim_matches(['"', '\'', '`']).trim().trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use deploydesk_core::domain::session::Field;
    use deploydesk_core::flows::{Confirmation, DialogueState, TurnEvent};

    use super::TurnParser;

    fn event(text: &str, state: DialogueState) -> Option<TurnEvent> {
        TurnParser::new().parse(text, state).event
    }

    #[test]
    fn bare_text_fills_the_field_being_collected() {
        assert_eq!(
            event("Google Chrome", DialogueState::CollectingSoftware),
            Some(TurnEvent::FactProvided {
                field: Field::Software,
                value: "Google Chrome".to_string()
            })
        );
        assert_eq!(
            event("  WKS-1001 ", DialogueState::CollectingComputer),
            Some(TurnEvent::FactProvided { field: Field::Computer, value: "WKS-1001".to_string() })
        );
        assert_eq!(
            event("\"jdoe\"", DialogueState::CollectingUsername),
            Some(TurnEvent::FactProvided { field: Field::Username, value: "jdoe".to_string() })
        );
    }

    #[test]
    fn keyed_facts_are_read_in_any_state() {
        assert_eq!(
            event("computer name is WKS-2002", DialogueState::CollectingSoftware),
            Some(TurnEvent::FactProvided { field: Field::Computer, value: "WKS-2002".to_string() })
        );
        assert_eq!(
            event("Install Visual Studio Code", DialogueState::CollectingUsername),
            Some(TurnEvent::FactProvided {
                field: Field::Software,
                value: "Visual Studio Code".to_string()
            })
        );
        assert_eq!(
            event("username: jdoe", DialogueState::AwaitingConfirmation),
            Some(TurnEvent::FactProvided { field: Field::Username, value: "jdoe".to_string() })
        );
    }

    #[test]
    fn keyword_prefix_needs_a_separator() {
        assert_eq!(
            event("Softwarex Pro", DialogueState::CollectingSoftware),
            Some(TurnEvent::FactProvided {
                field: Field::Software,
                value: "Softwarex Pro".to_string()
            })
        );
    }

    #[test]
    fn confirmation_words_map_to_answers() {
        assert_eq!(
            event("Yes, go ahead", DialogueState::AwaitingConfirmation),
            Some(TurnEvent::ConfirmationProvided { answer: Confirmation::Yes })
        );
        assert_eq!(
            event("Yes!", DialogueState::AwaitingConfirmation),
            Some(TurnEvent::ConfirmationProvided { answer: Confirmation::Yes })
        );
        assert_eq!(
            event("nope", DialogueState::AwaitingConfirmation),
            Some(TurnEvent::ConfirmationProvided { answer: Confirmation::No })
        );
    }

    #[test]
    fn yes_outside_confirmation_is_still_an_answer() {
        assert_eq!(
            event("yes", DialogueState::CollectingSoftware),
            Some(TurnEvent::ConfirmationProvided { answer: Confirmation::Yes })
        );
    }

    #[test]
    fn answer_words_inside_a_value_stay_part_of_the_value() {
        assert_eq!(
            event("No Machine", DialogueState::CollectingSoftware),
            Some(TurnEvent::FactProvided { field: Field::Software, value: "No Machine".to_string() })
        );
    }

    #[test]
    fn correction_requests_name_the_field() {
        assert_eq!(
            event("change the computer name", DialogueState::AwaitingConfirmation),
            Some(TurnEvent::CorrectionRequested { field: Field::Computer })
        );
        assert_eq!(
            event("Change my username", DialogueState::AwaitingConfirmation),
            Some(TurnEvent::CorrectionRequested { field: Field::Username })
        );
    }

    #[test]
    fn list_and_cancel_requests_are_recognised() {
        assert_eq!(
            event("which software can I get?", DialogueState::CollectingSoftware),
            Some(TurnEvent::ListRequested)
        );
        assert_eq!(event("list", DialogueState::CollectingComputer), Some(TurnEvent::ListRequested));
        assert_eq!(
            event("cancel", DialogueState::AwaitingConfirmation),
            Some(TurnEvent::CancelRequested)
        );
    }

    #[test]
    fn unclear_input_asks_for_clarification() {
        let parser = TurnParser::new();

        let blank = parser.parse("   ", DialogueState::CollectingSoftware);
        assert!(blank.event.is_none());
        assert!(blank.clarification_prompt.is_some());

        let vague = parser.parse("hmm maybe", DialogueState::AwaitingConfirmation);
        assert!(vague.event.is_none());
        assert!(vague.clarification_prompt.is_some());

        let finished = parser.parse("Zoom", DialogueState::Done);
        assert!(finished.event.is_none());
    }

    #[test]
    fn bare_field_name_after_a_no_picks_the_field_to_change() {
        for (text, field) in [
            ("the computer name", Field::Computer),
            ("computer name", Field::Computer),
            ("software", Field::Software),
            ("The username.", Field::Username),
            ("my username", Field::Username),
        ] {
            assert_eq!(
                event(text, DialogueState::AwaitingConfirmation),
                Some(TurnEvent::CorrectionRequested { field }),
                "{text}"
            );
        }
    }

    #[test]
    fn bare_field_name_outside_confirmation_is_a_value() {
        assert_eq!(
            event("username", DialogueState::CollectingUsername),
            Some(TurnEvent::FactProvided { field: Field::Username, value: "username".to_string() })
        );
    }

    #[test]
    fn yes_followed_by_a_change_is_a_correction_not_assent() {
        assert_eq!(
            event("yes, but change the username", DialogueState::AwaitingConfirmation),
            Some(TurnEvent::CorrectionRequested { field: Field::Username })
        );
        assert_eq!(
            event("No, fix my computer name", DialogueState::AwaitingConfirmation),
            Some(TurnEvent::CorrectionRequested { field: Field::Computer })
        );
    }

    #[test]
    fn yes_thats_correct_is_still_assent() {
        assert_eq!(
            event("Yes, that's correct", DialogueState::AwaitingConfirmation),
            Some(TurnEvent::ConfirmationProvided { answer: Confirmation::Yes })
        );
    }

    #[test]
    fn hedged_yes_asks_for_clarification() {
        let parsed =
            TurnParser::new().parse("yes but wait a second", DialogueState::AwaitingConfirmation);

        assert!(parsed.event.is_none());
        assert!(parsed.clarification_prompt.is_some());
    }

    #[test]
    fn correction_words_inside_a_software_name_stay_a_value() {
        assert_eq!(
            event("Windows Update Assistant", DialogueState::CollectingSoftware),
            Some(TurnEvent::FactProvided {
                field: Field::Software,
                value: "Windows Update Assistant".to_string()
            })
        );
    }
}
