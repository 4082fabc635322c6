use std::str::FromStr;

use crate::session::{SessionController, SessionView};

/// User actions available on the scanner page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    ToggleScanning,
    ToggleSavingMode,
    ClearHistory,
    AcknowledgeNotice,
    ShowView,
    Quit,
}

impl FromStr for SessionCommand {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "scan" | "s" => Ok(Self::ToggleScanning),
            "save" | "camera" => Ok(Self::ToggleSavingMode),
            "clear" => Ok(Self::ClearHistory),
            "ok" | "ack" => Ok(Self::AcknowledgeNotice),
            "view" | "list" | "" => Ok(Self::ShowView),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(format!(
                "unknown command {other:?} (scan, save, clear, ok, view, quit)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CommandReply {
    Done,
    View(SessionView),
    Quit,
}

pub async fn toggle_scanning(controller: &SessionController) -> Result<bool, String> {
    controller.toggle_scanning().await.map_err(|e| e.to_string())
}

pub async fn toggle_saving_mode(controller: &SessionController) -> Result<bool, String> {
    controller
        .toggle_saving_mode()
        .await
        .map_err(|e| format!("{e:#}"))
}

pub async fn clear_history(controller: &SessionController) -> Result<(), String> {
    controller.clear_history().await;
    Ok(())
}

pub async fn acknowledge_notice(controller: &SessionController) -> Result<bool, String> {
    Ok(controller.acknowledge_notice().await)
}

pub async fn get_view(controller: &SessionController) -> Result<SessionView, String> {
    Ok(controller.view().await)
}

pub async fn dispatch(
    controller: &SessionController,
    command: SessionCommand,
) -> Result<CommandReply, String> {
    match command {
        SessionCommand::ToggleScanning => toggle_scanning(controller).await.map(|_| CommandReply::Done),
        SessionCommand::ToggleSavingMode => {
            toggle_saving_mode(controller).await.map(|_| CommandReply::Done)
        }
        SessionCommand::ClearHistory => clear_history(controller).await.map(|_| CommandReply::Done),
        SessionCommand::AcknowledgeNotice => {
            acknowledge_notice(controller).await.map(|_| CommandReply::Done)
        }
        SessionCommand::ShowView => get_view(controller).await.map(CommandReply::View),
        SessionCommand::Quit => Ok(CommandReply::Quit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_button_presses() {
        assert_eq!("scan".parse(), Ok(SessionCommand::ToggleScanning));
        assert_eq!(" SAVE ".parse(), Ok(SessionCommand::ToggleSavingMode));
        assert_eq!("clear".parse(), Ok(SessionCommand::ClearHistory));
        assert_eq!("ok".parse(), Ok(SessionCommand::AcknowledgeNotice));
        assert_eq!("".parse(), Ok(SessionCommand::ShowView));
        assert_eq!("q".parse(), Ok(SessionCommand::Quit));
        assert!("dance".parse::<SessionCommand>().is_err());
    }
}
