use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Sender {
	User,
	Bot,
}
impl TryFrom<u8> for Sender {
	type Error = String;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(Self::User),
			1 => Ok(Self::Bot),
			other => Err(format!("Unknown history sender {other}; expected 0 (user) or 1 (bot).")),
		}
	}
}
impl From<Sender> for u8 {
	fn from(sender: Sender) -> Self {
		match sender {
			Sender::User => 0,
			Sender::Bot => 1,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
	pub sender: Sender,
	pub content: String,
}
impl Turn {
	pub fn user(content: impl Into<String>) -> Self {
		Self { sender: Sender::User, content: content.into() }
	}

	pub fn bot(content: impl Into<String>) -> Self {
		Self { sender: Sender::Bot, content: content.into() }
	}
}

/// One user turn paired with the bot turn that answered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
	pub user: String,
	pub bot: String,
}
impl Exchange {
	pub fn new(user: impl Into<String>, bot: impl Into<String>) -> Self {
		Self { user: user.into(), bot: bot.into() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedHistory {
	pub exchanges: Vec<Exchange>,
	/// Set when the log ended on a user turn that no bot turn answered.
	pub ends_with_user: bool,
}

/// Collapses runs of same-sender turns (joined with `\n`) and pairs each user run with the bot
/// run that follows it.
///
/// A bot run with no preceding user run pairs with an empty user text. A trailing user run is
/// emitted as `(user, "")` and flagged through [`MergedHistory::ends_with_user`].
pub fn merge_history(turns: &[Turn]) -> MergedHistory {
	let mut merged = MergedHistory::default();
	let mut pending_user = String::new();
	let mut current: Option<(Sender, String)> = None;

	for turn in turns {
		if let Some((sender, text)) = current.as_mut()
			&& *sender == turn.sender
		{
			text.push('\n');
			text.push_str(&turn.content);

			continue;
		}
		if let Some((sender, text)) = current.take() {
			close_run(&mut merged, &mut pending_user, sender, text);
		}

		current = Some((turn.sender, turn.content.clone()));
	}

	match current {
		Some((Sender::User, text)) => {
			merged.exchanges.push(Exchange::new(text, String::new()));
			merged.ends_with_user = true;
		},
		Some((Sender::Bot, text)) => {
			merged.exchanges.push(Exchange::new(pending_user, text));
		},
		None => {},
	}

	merged
}

fn close_run(merged: &mut MergedHistory, pending_user: &mut String, sender: Sender, text: String) {
	match sender {
		Sender::User => *pending_user = text,
		Sender::Bot => merged.exchanges.push(Exchange::new(std::mem::take(pending_user), text)),
	}
}
