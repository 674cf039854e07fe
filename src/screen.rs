//! Presentation layer for the public display
//!
//! The announcer and poller only talk to the [`Screen`] trait. The terminal
//! implementation renders the same panels the web display shows: the
//! "now calling" slot, the waiting list, recent calls and finished tickets.

use chrono::DateTime;
use chrono_tz::Tz;
use std::io::Write;
use std::sync::Mutex;
use tracing::warn;

use crate::model::{BoardStatus, CallRecord, Ticket, WaitingEntry};

/// Render target for the display
pub trait Screen: Send + Sync {
    /// Put a call in the "now calling" slot
    fn show_call(&self, record: &CallRecord);
    /// Nothing has been called yet
    fn show_idle(&self);
    /// Refresh the side panels
    fn show_board(&self, board: &BoardView);
    /// Backend unreachable; the calling slot is left untouched
    fn show_offline(&self, reason: &str);
}

/// Row limits for the side panels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelLimits {
    pub waiting: usize,
    pub recent: usize,
    pub finished: usize,
}

impl Default for PanelLimits {
    fn default() -> Self {
        Self {
            waiting: 4,
            recent: 4,
            finished: 5,
        }
    }
}

/// Side panels as shown, already truncated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    /// Patient in service, if any
    pub current: Option<Ticket>,
    pub waiting: Vec<WaitingEntry>,
    pub recent: Vec<CallRecord>,
    pub finished: Vec<Ticket>,
    /// Local clock at refresh time, `HH:MM:SS`
    pub updated_at: String,
}

impl BoardView {
    pub fn from_status(status: &BoardStatus, limits: PanelLimits, now: DateTime<Tz>) -> Self {
        Self {
            current: status.current.clone(),
            waiting: status.waiting.iter().take(limits.waiting).cloned().collect(),
            recent: status.recent_calls.iter().take(limits.recent).cloned().collect(),
            finished: status.finished.iter().take(limits.finished).cloned().collect(),
            updated_at: now.format("%H:%M:%S").to_string(),
        }
    }
}

pub(crate) fn or_dash(s: &str) -> &str {
    if s.trim().is_empty() {
        "-"
    } else {
        s
    }
}

fn minutes(value: Option<i64>) -> String {
    value.map_or_else(|| "--".to_string(), |m| m.to_string())
}

pub fn render_call(record: &CallRecord) -> String {
    let code = if record.display_code.trim().is_empty() {
        "S/N"
    } else {
        record.display_code.as_str()
    };
    format!(
        "==================== CHAMANDO ====================\n  {}\n  {}\n",
        code,
        or_dash(&record.patient_name)
    )
}

pub fn render_idle() -> String {
    "==================== AGUARDANDO ====================\n  ---\n  Nenhum paciente em atendimento\n"
        .to_string()
}

pub fn render_board(board: &BoardView) -> String {
    let mut out = format!("-- Painel atualizado {} --\n", board.updated_at);

    match &board.current {
        Some(ticket) => out.push_str(&format!(
            "Em atendimento: {} {}\n",
            or_dash(&ticket.display_code),
            or_dash(&ticket.patient_name)
        )),
        None => out.push_str("Em atendimento: ---\n"),
    }

    out.push_str("Aguardando atendimento:\n");
    if board.waiting.is_empty() {
        out.push_str("  Nenhum paciente aguardando\n");
    }
    for entry in &board.waiting {
        out.push_str(&format!(
            "  {:<8} {}  (Aguardando {} min • Previsão {} min)\n",
            or_dash(&entry.display_code),
            or_dash(&entry.patient_name),
            minutes(entry.waiting_min),
            minutes(entry.forecast_min)
        ));
    }

    out.push_str("Chamados recentemente:\n");
    if board.recent.is_empty() {
        out.push_str("  Nenhum chamado recente\n");
    }
    for call in &board.recent {
        out.push_str(&format!(
            "  {:<8} {}  (Chamado há {} min)\n",
            or_dash(&call.display_code),
            or_dash(&call.patient_name),
            minutes(call.minutes_ago)
        ));
    }

    out.push_str("Finalizados:\n");
    if board.finished.is_empty() {
        out.push_str("  Nenhum atendimento finalizado\n");
    }
    for ticket in &board.finished {
        out.push_str(&format!(
            "  {:<8} {}\n",
            or_dash(&ticket.display_code),
            or_dash(&ticket.patient_name)
        ));
    }

    out
}

pub fn render_offline(reason: &str) -> String {
    format!("!! Sem conexão com o servidor: {}\n", reason)
}

/// Writes rendered panels to any `Write` sink (stdout in production)
pub struct TerminalScreen<W: Write + Send> {
    out: Mutex<W>,
}

impl TerminalScreen<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalScreen<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self, text: &str) {
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
            warn!("Failed to write to display: {}", e);
        }
    }
}

impl<W: Write + Send> Screen for TerminalScreen<W> {
    fn show_call(&self, record: &CallRecord) {
        self.write(&render_call(record));
    }

    fn show_idle(&self) {
        self.write(&render_idle());
    }

    fn show_board(&self, board: &BoardView) {
        self.write(&render_board(board));
    }

    fn show_offline(&self, reason: &str) {
        self.write(&render_offline(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::Sao_Paulo;

    fn now() -> DateTime<Tz> {
        Sao_Paulo.with_ymd_and_hms(2026, 10, 16, 9, 30, 5).unwrap()
    }

    fn waiting(code: &str) -> WaitingEntry {
        WaitingEntry {
            patient_name: format!("Paciente {}", code),
            display_code: code.to_string(),
            waiting_min: Some(3),
            forecast_min: Some(10),
        }
    }

    #[test]
    fn test_render_call() {
        let text = render_call(&CallRecord::new("P-001", "Ana", None));
        assert!(text.contains("CHAMANDO"));
        assert!(text.contains("P-001"));
        assert!(text.contains("Ana"));
    }

    #[test]
    fn test_render_call_without_code() {
        let text = render_call(&CallRecord::new("", "", None));
        assert!(text.contains("S/N"));
        assert!(text.contains("  -\n"));
    }

    #[test]
    fn test_render_idle() {
        let text = render_idle();
        assert!(text.contains("AGUARDANDO"));
        assert!(text.contains("Nenhum paciente em atendimento"));
    }

    #[test]
    fn test_board_view_truncates_panels() {
        let status = BoardStatus {
            current: None,
            waiting: (1..=6).map(|i| waiting(&format!("N-00{}", i))).collect(),
            recent_calls: (1..=6)
                .map(|i| CallRecord::new(&format!("C-00{}", i), "x", None))
                .collect(),
            finished: (1..=8)
                .map(|i| Ticket {
                    patient_name: "y".into(),
                    display_code: format!("F-00{}", i),
                })
                .collect(),
        };

        let board = BoardView::from_status(&status, PanelLimits::default(), now());
        assert_eq!(board.waiting.len(), 4);
        assert_eq!(board.recent.len(), 4);
        assert_eq!(board.finished.len(), 5);
        assert_eq!(board.recent[0].display_code, "C-001");
        assert_eq!(board.updated_at, "09:30:05");
    }

    #[test]
    fn test_render_board_empty_states() {
        let board = BoardView::from_status(&BoardStatus::default(), PanelLimits::default(), now());
        let text = render_board(&board);
        assert!(text.contains("Nenhum paciente aguardando"));
        assert!(text.contains("Nenhum chamado recente"));
        assert!(text.contains("Nenhum atendimento finalizado"));
        assert!(text.contains("Em atendimento: ---"));
    }

    #[test]
    fn test_render_board_rows() {
        let mut recent = CallRecord::new("N-007", "Caio", None);
        recent.minutes_ago = Some(2);
        let status = BoardStatus {
            current: Some(Ticket {
                patient_name: "Ana".into(),
                display_code: "P-003".into(),
            }),
            waiting: vec![waiting("N-008")],
            recent_calls: vec![recent],
            finished: vec![],
        };
        let board = BoardView::from_status(&status, PanelLimits::default(), now());
        let text = render_board(&board);
        assert!(text.contains("Aguardando 3 min • Previsão 10 min"));
        assert!(text.contains("Chamado há 2 min"));
        assert!(text.contains("Em atendimento: P-003 Ana"));
        assert!(text.contains("N-007"));
    }

    #[test]
    fn test_render_board_blank_codes_show_dash() {
        let status = BoardStatus {
            current: None,
            waiting: vec![waiting("")],
            recent_calls: vec![CallRecord::new("", "Caio", None)],
            finished: vec![Ticket {
                patient_name: "Duda".into(),
                display_code: " ".into(),
            }],
        };
        let board = BoardView::from_status(&status, PanelLimits::default(), now());
        let text = render_board(&board);
        assert!(text.contains("  -        Paciente "), "{}", text);
        assert!(text.contains("  -        Caio"), "{}", text);
        assert!(text.contains("  -        Duda"), "{}", text);
    }

    #[test]
    fn test_terminal_screen_writes_to_sink() {
        let screen = TerminalScreen::new(Vec::new());
        screen.show_call(&CallRecord::new("P-002", "Bia", None));
        screen.show_offline("timeout");
        let text = String::from_utf8(screen.into_inner()).unwrap();
        assert!(text.contains("P-002"));
        assert!(text.contains("Sem conexão com o servidor: timeout"));
    }
}
