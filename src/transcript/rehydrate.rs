//! Rebuild the renderable projection from a committed transcript

use super::message::{AiState, Role, RENDERED_FUNCTION_NAME};
use crate::stream::{Display, UiEntry};

/// Map a committed transcript to UI entries without touching the network.
///
/// System entries are skipped. Function entries named
/// [`RENDERED_FUNCTION_NAME`] come back as bot cards, other function entries
/// are context for the model only and render as [`Display::Empty`]. Entry ids
/// are `{chat_id}-{index}` over the non-system entries, so the same transcript
/// always yields the same projection.
pub fn ui_state_from_ai_state(state: &AiState) -> Vec<UiEntry> {
    state
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .enumerate()
        .map(|(index, message)| {
            let display = match message.role {
                Role::Function if message.is_function_named(RENDERED_FUNCTION_NAME) => {
                    Display::BotCard {
                        body: message.content.clone(),
                    }
                }
                Role::Function => Display::Empty,
                Role::User => Display::UserMessage {
                    text: message.content.clone(),
                },
                _ => Display::bot_text(message.content.clone()),
            };
            UiEntry::settled(format!("{}-{index}", state.chat_id), display)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Phase;
    use crate::transcript::Message;
    use proptest::prelude::*;

    fn contents(entries: &[UiEntry]) -> Vec<(String, Display)> {
        entries.iter().map(UiEntry::content).collect()
    }

    #[test]
    fn test_maps_each_role() {
        let state = AiState::with_messages(
            "c1",
            vec![
                Message::user("my head hurts"),
                Message::system("[context]"),
                Message::assistant("since when?"),
                Message::function("render", "headache, 2 days"),
                Message::function("showStockPurchase", "{}"),
            ],
        );

        let ui = contents(&ui_state_from_ai_state(&state));
        assert_eq!(
            ui,
            vec![
                (
                    "c1-0".to_string(),
                    Display::UserMessage {
                        text: "my head hurts".to_string()
                    }
                ),
                ("c1-1".to_string(), Display::bot_text("since when?")),
                (
                    "c1-2".to_string(),
                    Display::BotCard {
                        body: "headache, 2 days".to_string()
                    }
                ),
                ("c1-3".to_string(), Display::Empty),
            ]
        );
    }

    #[test]
    fn test_rehydrated_entries_are_sealed() {
        let state = AiState::with_messages("c1", vec![Message::user("hi")]);
        let ui = ui_state_from_ai_state(&state);
        assert_eq!(ui[0].display.phase(), Phase::Done);
    }

    #[test]
    fn test_empty_transcript() {
        assert!(ui_state_from_ai_state(&AiState::new("c1")).is_empty());
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        let role = prop_oneof![
            Just(Role::User),
            Just(Role::Assistant),
            Just(Role::System),
            Just(Role::Data),
            Just(Role::Tool),
        ];
        let name = prop_oneof![
            Just(None),
            Just(Some("render".to_string())),
            Just(Some("showStockPurchase".to_string())),
        ];
        (role, "\\PC{0,20}", name, any::<bool>()).prop_map(|(role, content, name, as_function)| {
            match name {
                Some(name) if as_function => Message::function(name, content),
                _ => Message::new(role, content),
            }
        })
    }

    proptest! {
        #[test]
        fn prop_rehydration_is_deterministic(
            messages in prop::collection::vec(arb_message(), 0..16)
        ) {
            let state = AiState::with_messages("chat", messages);
            let first = contents(&ui_state_from_ai_state(&state));
            let second = contents(&ui_state_from_ai_state(&state));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_one_entry_per_non_system_message(
            messages in prop::collection::vec(arb_message(), 0..16)
        ) {
            let state = AiState::with_messages("chat", messages);
            let expected = state.messages.len() - state.count_role(Role::System);
            prop_assert_eq!(ui_state_from_ai_state(&state).len(), expected);
        }
    }
}
