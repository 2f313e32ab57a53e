//! Cross-crate tests: core session flow through the public API and headless
//! rendering of the desktop UI.

#[cfg(test)]
mod ui;
#[cfg(test)]
mod unit;
