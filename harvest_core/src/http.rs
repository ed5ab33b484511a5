//! Small HTTP conventions shared by the session factory and the catalog
//! client: the fixed browser-like header set and a random user-agent.
//!
//! The source script shells out to a Python UA-faker library for this; we
//! sample from a fixed pool of realistic desktop browser strings instead of
//! carrying a generator dependency for one field.

use rand::seq::SliceRandom;

const USER_AGENTS: &[&str] = &[
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
	"Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
	"Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36",
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:129.0) Gecko/20100101 Firefox/129.0",
	"Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
];

/// Picks a random user-agent string from the fixed pool.
#[must_use]
pub fn random_user_agent() -> &'static str {
	USER_AGENTS.choose(&mut rand::thread_rng()).copied().unwrap_or(USER_AGENTS[0])
}

/// The catalog's origin/referer pair, shared by every session.
pub const ORIGIN: &str = "https://g2.ltfc.net";
pub const REFERER: &str = "https://g2.ltfc.net/";
pub const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9";

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn random_user_agent_is_from_the_pool() {
		for _ in 0..20 {
			assert!(USER_AGENTS.contains(&random_user_agent()));
		}
	}
}
