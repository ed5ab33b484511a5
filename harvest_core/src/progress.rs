//! Progress reporting abstraction: a real terminal indicator under the `cli`
//! feature, a silent drain otherwise (tests, library embedding) — the same
//! split the host toolbox's progress module makes.

/// Interface every progress indicator implements, modeled after the host
/// toolbox's `ProgressTrait`.
pub trait ProgressTrait: Send + Sync {
	fn init(&mut self, message: &str, max_value: u64);
	fn set_position(&mut self, value: u64);
	fn inc(&mut self, value: u64);
	fn finish(&mut self);
}

/// A progress indicator that does nothing; used whenever the `cli` feature
/// is off (library embedding, tests).
#[derive(Default)]
pub struct ProgressDrain {
	position: u64,
	max_value: u64,
}

impl ProgressTrait for ProgressDrain {
	fn init(&mut self, _message: &str, max_value: u64) {
		self.max_value = max_value;
		self.position = 0;
	}

	fn set_position(&mut self, value: u64) {
		self.position = value.min(self.max_value.max(value));
	}

	fn inc(&mut self, value: u64) {
		self.position += value;
	}

	fn finish(&mut self) {}
}

#[cfg(feature = "cli")]
struct TerminalProgress {
	bar: indicatif::ProgressBar,
}

#[cfg(feature = "cli")]
impl ProgressTrait for TerminalProgress {
	fn init(&mut self, message: &str, max_value: u64) {
		self.bar = indicatif::ProgressBar::new(max_value);
		self.bar.set_style(
			indicatif::ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
				.unwrap_or_else(|_| indicatif::ProgressStyle::default_bar()),
		);
		self.bar.set_message(message.to_string());
	}

	fn set_position(&mut self, value: u64) {
		self.bar.set_position(value);
	}

	fn inc(&mut self, value: u64) {
		self.bar.inc(value);
	}

	fn finish(&mut self) {
		self.bar.finish_and_clear();
	}
}

/// Creates a progress indicator: a real terminal bar under the `cli`
/// feature, a silent drain otherwise.
#[must_use]
pub fn get_progress(message: &str, max_value: u64) -> Box<dyn ProgressTrait> {
	#[cfg(feature = "cli")]
	let mut progress: Box<dyn ProgressTrait> = Box::new(TerminalProgress { bar: indicatif::ProgressBar::hidden() });
	#[cfg(not(feature = "cli"))]
	let mut progress: Box<dyn ProgressTrait> = Box::new(ProgressDrain::default());
	progress.init(message, max_value);
	progress
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn drain_tracks_position() {
		let mut progress = ProgressDrain::default();
		progress.init("test", 100);
		progress.set_position(10);
		progress.inc(5);
		assert_eq!(progress.position, 15);
		progress.finish();
	}

	#[test]
	fn factory_returns_initialized_indicator() {
		let progress = get_progress("artists", 42);
		drop(progress);
	}
}
