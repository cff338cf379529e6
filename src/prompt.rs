//! User prompting behind a trait
//!
//! The core pipeline never talks to the terminal directly: it asks a
//! [`Prompter`] for confirmations and choices. The CLI implementation uses
//! dialoguer; the non-interactive implementation auto-confirms when the
//! user passed `-y` and otherwise fails with a clear error naming the
//! decision that was needed.

use crate::resolver::VariantChoice;
use crate::{Error, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Select};

pub trait Prompter {
    /// Yes/no question with a default answer.
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;

    /// Pick one item; returns its index.
    fn choose(&self, prompt: &str, items: &[String]) -> Result<usize>;

    fn is_interactive(&self) -> bool;

    /// Ask for the value of one missing variant key and return the choice.
    fn choose_variant(&self, choice: &VariantChoice) -> Result<(String, String)> {
        let prompt = format!(
            "{} supports multiple variants. Choose a value for '{}' (one of: {})",
            choice.package,
            choice.key,
            choice.values.join(", ")
        );
        let index = self.choose(&prompt, &choice.values)?;
        Ok((choice.key.clone(), choice.values[index].clone()))
    }
}

/// Terminal prompting via dialoguer.
pub struct CliPrompter {
    theme: ColorfulTheme,
}

impl CliPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for CliPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for CliPrompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(question)
            .default(default)
            .interact()
            .map_err(|e| Error::NotInteractive(format!("{}: {}", question, e)))
    }

    fn choose(&self, prompt: &str, items: &[String]) -> Result<usize> {
        Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()
            .map_err(|e| Error::NotInteractive(format!("{}: {}", prompt, e)))
    }

    fn is_interactive(&self) -> bool {
        true
    }
}

/// Prompter for non-interactive sessions (`-y`, pipes, CI).
pub struct NonInteractivePrompter {
    assume_yes: bool,
}

impl NonInteractivePrompter {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Prompter for NonInteractivePrompter {
    fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
        if self.assume_yes {
            Ok(true)
        } else {
            Err(Error::NotInteractive(question.to_string()))
        }
    }

    fn choose(&self, prompt: &str, _items: &[String]) -> Result<usize> {
        Err(Error::NotInteractive(prompt.to_string()))
    }

    fn is_interactive(&self) -> bool {
        false
    }
}
