#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Quit,
    Clear,
    /// Lists prompt templates, or applies template `n` as system instruction.
    Prompt(Option<usize>),
    /// Lists styles, or switches to the named or numbered one.
    Style(Option<String>),
    /// Reviews a git diff file, `gitdiff.txt` when no path is given.
    Review(Option<String>),
    Save,
    /// Lists stored histories, or loads the named or numbered one.
    Load(Option<String>),
    History,
    Models,
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
/help             show this help
/quit             leave (also: exit)
/clear            forget the conversation
/prompt [n]       list prompt templates or use template n as system instruction
/style [name|n]   list display styles or switch style
/review [path]    review a git diff file (default gitdiff.txt)
/save             store the conversation under a generated name
/load [name|n]    list stored conversations or load one
/history          show the number of history entries
/models           list available models
Ctrl-C cancels a streaming reply.";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("exit") {
        return Some(SlashCommand::Quit);
    }
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, argument) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, Some(rest.trim().to_string()).filter(|rest| !rest.is_empty())),
        None => (trimmed, None),
    };

    let parsed = match command {
        "/help" => SlashCommand::Help,
        "/quit" | "/exit" => SlashCommand::Quit,
        "/clear" => SlashCommand::Clear,
        "/prompt" => match argument {
            None => SlashCommand::Prompt(None),
            Some(argument) => match argument.parse::<usize>() {
                Ok(index) => SlashCommand::Prompt(Some(index)),
                Err(_) => SlashCommand::Unknown(format!("{command} {argument}")),
            },
        },
        "/style" => SlashCommand::Style(argument),
        "/review" => SlashCommand::Review(argument),
        "/save" => SlashCommand::Save,
        "/load" => SlashCommand::Load(argument),
        "/history" => SlashCommand::History,
        "/models" => SlashCommand::Models,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}
