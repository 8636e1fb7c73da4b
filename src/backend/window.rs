//! Context window fitting
//!
//! The system prompt and the newest message are mandatory. Older history is
//! dropped oldest-first until the request fits the window minus the tokens
//! reserved for the completion.

use super::{Message, Role};
use crate::error::InferenceError;

/// Per-message framing cost (role markers, separators)
pub const MESSAGE_OVERHEAD: usize = 4;

/// Rough token estimate: four characters per token plus framing
pub fn estimate_tokens(message: &Message) -> usize {
    message.content.len().div_ceil(4) + MESSAGE_OVERHEAD
}

/// Tokens kept free for the answer
pub fn completion_reserve(window: usize, max_tokens: Option<u32>) -> usize {
    match max_tokens {
        Some(max) => max as usize,
        None => window / 4,
    }
}

/// Trim `messages` to fit `window`
pub fn fit<F>(messages: &[Message], window: usize, reserve: usize, count: F) -> Result<Vec<Message>, InferenceError>
where
    F: Fn(&Message) -> usize,
{
    let budget = window.saturating_sub(reserve);

    let (system, rest) = match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (Some(first), rest),
        _ => (None, messages),
    };
    let Some((newest, history)) = rest.split_last() else {
        return Ok(messages.to_vec());
    };

    let mandatory = system.map(&count).unwrap_or(0) + count(newest);
    if mandatory > budget {
        return Err(InferenceError::ContextOverflow {
            required: mandatory + reserve,
            window,
        });
    }

    let mut used = mandatory;
    let mut kept = 0;
    for message in history.iter().rev() {
        let cost = count(message);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept += 1;
    }

    let dropped = history.len() - kept;
    if dropped > 0 {
        log::info!("Dropped {} oldest messages to fit a {} token window", dropped, window);
    }

    let mut fitted = Vec::with_capacity(kept + 2);
    fitted.extend(system.cloned());
    fitted.extend(history[dropped..].iter().cloned());
    fitted.push(newest.clone());
    Ok(fitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
        }
    }

    /// One token per character, no overhead
    fn chars(message: &Message) -> usize {
        message.content.len()
    }

    #[test]
    fn test_everything_fits() {
        let messages = vec![
            message(Role::System, "sys"),
            message(Role::User, "hello"),
            message(Role::Assistant, "hi"),
            message(Role::User, "again"),
        ];
        let fitted = fit(&messages, 100, 10, chars).unwrap();
        assert_eq!(fitted, messages);
    }

    #[test]
    fn test_oldest_dropped_first() {
        let messages = vec![
            message(Role::System, "sys"),
            message(Role::User, "aaaaaaaaaa"),
            message(Role::Assistant, "bbbbbbbbbb"),
            message(Role::User, "cc"),
        ];
        // budget 20: sys(3) + cc(2) + bbbbbbbbbb(10) = 15, the next 10 do not fit
        let fitted = fit(&messages, 30, 10, chars).unwrap();
        let contents: Vec<&str> = fitted.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "bbbbbbbbbb", "cc"]);
    }

    #[test]
    fn test_overflow_when_mandatory_too_large() {
        let messages = vec![message(Role::System, "a long system prompt"), message(Role::User, "question")];
        let err = fit(&messages, 20, 5, chars).unwrap_err();
        assert_eq!(
            err,
            InferenceError::ContextOverflow {
                required: 33,
                window: 20
            }
        );
    }

    #[test]
    fn test_without_system_message() {
        let messages = vec![message(Role::User, "old"), message(Role::User, "new")];
        let fitted = fit(&messages, 5, 0, chars).unwrap();
        assert_eq!(fitted, vec![message(Role::User, "new")]);
    }

    #[test]
    fn test_empty_history() {
        assert!(fit(&[], 10, 0, chars).unwrap().is_empty());
        let only_system = vec![message(Role::System, "sys")];
        assert_eq!(fit(&only_system, 10, 0, chars).unwrap(), only_system);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(&message(Role::User, "")), MESSAGE_OVERHEAD);
        assert_eq!(estimate_tokens(&message(Role::User, "abcde")), 2 + MESSAGE_OVERHEAD);
    }

    #[test]
    fn test_completion_reserve() {
        assert_eq!(completion_reserve(2048, Some(100)), 100);
        assert_eq!(completion_reserve(2048, None), 512);
    }
}
