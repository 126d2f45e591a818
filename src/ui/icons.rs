//! Emoji constants for terminal output, with plain-text fallbacks.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[SKIP] ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN] ");
pub static STOP: Emoji<'_, '_> = Emoji("🛑 ", "[STOP] ");

// Run indicators
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>] ");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T] ");
pub static REPORT: Emoji<'_, '_> = Emoji("📊 ", "[REPORT] ");
