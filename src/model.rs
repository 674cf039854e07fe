//! Wire types for the queue backend
//!
//! The backend owns the JSON shape, so everything here is parsed leniently:
//! missing or `null` fields fall back to defaults and a list that is not an
//! array (or contains junk entries) yields only the entries that parse.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A "now calling" entry from the recently-called window.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CallRecord {
    /// Ticket code shown on screen, e.g. `P-004`
    #[serde(rename = "senha", default, deserialize_with = "lenient_string")]
    pub display_code: String,
    #[serde(rename = "nome", default, deserialize_with = "lenient_string")]
    pub patient_name: String,
    /// Opaque call timestamp; only used as part of the dedup key
    #[serde(
        rename = "calledAt",
        default,
        deserialize_with = "opaque_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub called_at: Option<String>,
    /// Minutes since the call, as computed by the backend
    #[serde(
        rename = "tempo",
        default,
        deserialize_with = "opaque_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub minutes_ago: Option<i64>,
}

/// Identity of a call for deduplication: `(display_code, called_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    display_code: String,
    called_at: String,
}

impl CallRecord {
    pub fn new(display_code: &str, patient_name: &str, called_at: Option<&str>) -> Self {
        Self {
            display_code: display_code.to_string(),
            patient_name: patient_name.to_string(),
            called_at: called_at.map(str::to_string),
            minutes_ago: None,
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            display_code: self.display_code.clone(),
            called_at: self.called_at.clone().unwrap_or_default(),
        }
    }
}

/// `{nome, senha}` pair used for the current patient and the finished panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Ticket {
    #[serde(rename = "nome", default, deserialize_with = "lenient_string")]
    pub patient_name: String,
    #[serde(rename = "senha", default, deserialize_with = "lenient_string")]
    pub display_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WaitingEntry {
    #[serde(rename = "nome", default, deserialize_with = "lenient_string")]
    pub patient_name: String,
    #[serde(rename = "senha", default, deserialize_with = "lenient_string")]
    pub display_code: String,
    #[serde(rename = "aguardandoMin", default, deserialize_with = "opaque_i64")]
    pub waiting_min: Option<i64>,
    #[serde(rename = "previsaoMin", default, deserialize_with = "opaque_i64")]
    pub forecast_min: Option<i64>,
}

/// Response of `GET /api/visor/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BoardStatus {
    #[serde(rename = "pacienteAtual", default, deserialize_with = "lenient_option")]
    pub current: Option<Ticket>,
    #[serde(rename = "listaStatus", default, deserialize_with = "lenient_list")]
    pub waiting: Vec<WaitingEntry>,
    /// Newest first
    #[serde(rename = "chamadosRecentes", default, deserialize_with = "lenient_list")]
    pub recent_calls: Vec<CallRecord>,
    #[serde(rename = "finalizados", default, deserialize_with = "lenient_list")]
    pub finished: Vec<Ticket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatientKind {
    Normal,
    Preferencial,
}

impl PatientKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NORMAL" => Some(Self::Normal),
            "PREFERENCIAL" => Some(Self::Preferencial),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Preferencial => "PREFERENCIAL",
        }
    }
}

/// Row of `GET /api/fila` and `GET /api/historico`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Patient {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "nome", default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cpf: String,
    #[serde(rename = "telefone", default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(rename = "tipo", default, deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(rename = "previsao", default, deserialize_with = "opaque_i64")]
    pub forecast_min: Option<i64>,
    #[serde(rename = "senha", default, deserialize_with = "lenient_string")]
    pub display_code: String,
}

/// Body of `POST /api/pacientes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPatient {
    #[serde(rename = "nome")]
    pub name: String,
    pub cpf: String,
    #[serde(rename = "telefone")]
    pub phone: String,
    #[serde(rename = "idade")]
    pub age: u32,
    #[serde(rename = "tipo")]
    pub kind: PatientKind,
}

/// Reply to `PUT /api/pacientes/{id}/chamar`.
///
/// The backend may call a different patient than the one requested when its
/// preferential rule applies, so the called patient is echoed back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallOutcome {
    #[serde(rename = "regraPreferencialAplicada", default)]
    pub preferential_rule_applied: bool,
    #[serde(rename = "pacienteChamado", default, deserialize_with = "lenient_option")]
    pub called: Option<Ticket>,
}

/// Response of `GET /api/paciente/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PatientStatus {
    #[serde(rename = "nome", default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "senha", default, deserialize_with = "lenient_string")]
    pub display_code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(rename = "aguardandoMin", default, deserialize_with = "opaque_i64")]
    pub waiting_min: Option<i64>,
    #[serde(rename = "pessoasNaFrente", default, deserialize_with = "opaque_i64")]
    pub ahead: Option<i64>,
    #[serde(rename = "previsaoMin", default, deserialize_with = "opaque_i64")]
    pub forecast_min: Option<i64>,
}

/// Human label for a backend status code (`EM_ATENDIMENTO` -> `Em Atendimento`).
pub fn status_label(status: &str) -> &str {
    match status.trim().to_lowercase().replace('_', " ").as_str() {
        "aguardando" | "" => "Aguardando",
        "em atendimento" => "Em Atendimento",
        "finalizado" => "Finalizado",
        _ => status,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opaque_string(deserializer)?.unwrap_or_default())
}

/// Accept a string, number or bool; `null` becomes `None`.
fn opaque_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Whole minutes from an integer, a float or a numeric string; anything
/// else is treated as absent.
fn opaque_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = |f: f64| f.is_finite().then(|| f.round() as i64);
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(number)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(number))
        }
        _ => None,
    })
}

/// An object of the wrong shape is treated as absent.
fn lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}
