use color_eyre::{Result, eyre};
use serde_json::Value;

/// Sends OpenAI-style chat `messages` and returns the first choice's content.
pub async fn generate(cfg: &kbase_config::LlmProviderConfig, messages: &[Value]) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_generation_response(&json)
}

fn parse_generation_response(json: &Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.map(|content| content.trim().to_string())
		.ok_or_else(|| eyre::eyre!("Generation response is missing choice content."))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_first_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "role": "assistant", "content": "  Run the installer.\n" } }
			]
		});

		assert_eq!(parse_generation_response(&json).expect("parse failed"), "Run the installer.");
	}

	#[test]
	fn missing_choices_is_an_error() {
		assert!(parse_generation_response(&serde_json::json!({ "error": "busy" })).is_err());
	}
}
