use dialoguer::Input;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    /// stop asking and keep everything not confirmed yet
    Quit,
}

impl Answer {
    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => Some(Self::Yes),
            "n" | "no" => Some(Self::No),
            "q" | "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Asks the operator to confirm a deletion.
pub trait Prompt {
    fn confirm(&self, question: &str) -> anyhow::Result<Answer>;
}

/// Reads answers from the terminal, re-asking until it gets y, n or q.
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn confirm(&self, question: &str) -> anyhow::Result<Answer> {
        let input: String = Input::new()
            .with_prompt(format!("{question} [y/n/q]"))
            .validate_with(|input: &String| -> Result<(), &'static str> {
                Answer::parse(input)
                    .map(|_| ())
                    .ok_or("please answer y (delete), n (keep) or q (keep all remaining)")
            })
            .interact_text()?;
        // validated above
        Ok(Answer::parse(&input).unwrap_or(Answer::No))
    }
}
