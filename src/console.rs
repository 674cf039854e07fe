//! Attendant and patient console commands
//!
//! Terminal counterparts of the attendant page (register, call, finish,
//! queue and history tables) and the patient status page.

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::Command;
use crate::client::{ApiError, QueueClient};
use crate::model::{status_label, NewPatient, Patient, PatientKind, PatientStatus};
use crate::redact;
use crate::screen::or_dash;

/// Check the registration form the way the attendant page does before
/// anything is sent
pub fn validate_new_patient(
    name: &str,
    cpf: &str,
    phone: &str,
    age: &str,
    kind: &str,
) -> Result<NewPatient> {
    let fields = [name, cpf, phone, age, kind];
    if fields.iter().any(|f| f.trim().is_empty()) {
        bail!("Preencha todos os campos obrigatórios.");
    }

    if !redact::is_valid_cpf(cpf) {
        bail!("CPF inválido. Informe 11 dígitos.");
    }

    let age: u32 = age
        .trim()
        .parse()
        .with_context(|| format!("Idade inválida: '{}'", age))?;
    if age == 0 {
        bail!("Preencha todos os campos obrigatórios.");
    }

    let kind = PatientKind::parse(kind)
        .with_context(|| format!("Tipo inválido: '{}' (use NORMAL ou PREFERENCIAL)", kind))?;

    Ok(NewPatient {
        name: name.trim().to_string(),
        cpf: redact::digits_only(cpf),
        phone: redact::digits_only(phone),
        age,
        kind,
    })
}

fn kind_label(kind: &str) -> &str {
    if kind.trim().is_empty() {
        "NORMAL"
    } else {
        kind
    }
}

/// Attendant queue table
pub fn render_queue(patients: &[Patient]) -> String {
    if patients.is_empty() {
        return "Nenhum paciente na fila\n".to_string();
    }

    let mut out = format!(
        "{:<26} {:<24} {:<15} {:<13} {:<15} {:<9} {}\n",
        "ID", "NOME", "CPF", "TIPO", "STATUS", "PREVISÃO", "SENHA"
    );
    for p in patients {
        let forecast = p
            .forecast_min
            .map_or_else(|| "-".to_string(), |m| format!("{} min", m));
        out.push_str(&format!(
            "{:<26} {:<24} {:<15} {:<13} {:<15} {:<9} {}\n",
            or_dash(&p.id),
            or_dash(&p.name),
            redact::cpf(&p.cpf),
            kind_label(&p.kind),
            status_label(&p.status),
            forecast,
            or_dash(&p.display_code)
        ));
    }
    out
}

/// Finished-services table
pub fn render_history(patients: &[Patient]) -> String {
    if patients.is_empty() {
        return "Nenhum atendimento no histórico\n".to_string();
    }

    let mut out = format!(
        "{:<24} {:<15} {:<13} {:<13} {}\n",
        "NOME", "CPF", "TELEFONE", "TIPO", "SENHA"
    );
    for p in patients {
        out.push_str(&format!(
            "{:<24} {:<15} {:<13} {:<13} {}\n",
            or_dash(&p.name),
            redact::cpf(&p.cpf),
            or_dash(&p.phone),
            kind_label(&p.kind),
            or_dash(&p.display_code)
        ));
    }
    out
}

pub fn render_patient_status(status: &PatientStatus) -> String {
    let num = |v: Option<i64>| v.map_or_else(|| "--".to_string(), |n| n.to_string());
    format!(
        "Senha: {}\nNome: {}\nStatus: {}\nAguardando há: {} min\nPessoas na frente: {}\nPrevisão: {} min\n",
        if status.display_code.is_empty() { "---" } else { status.display_code.as_str() },
        if status.name.is_empty() { "---" } else { status.name.as_str() },
        status_label(&status.status),
        num(status.waiting_min),
        num(status.ahead),
        num(status.forecast_min)
    )
}

/// Token rejections get a hint; everything else passes through
fn explain(err: ApiError) -> anyhow::Error {
    match err {
        ApiError::Unauthorized => {
            warn!("Backend rejected the API token");
            anyhow::anyhow!("Não autorizado: token inválido ou expirado. Rode `clinic-visor login` e atualize QUEUE_API_TOKEN.")
        }
        other => other.into(),
    }
}

/// Run a console command and return what should be printed
pub async fn run_command(client: &QueueClient, command: &Command) -> Result<String> {
    match command {
        Command::Display => bail!("display is not a console command"),
        Command::Login { username, password } => {
            let token = client.login(username, password).await.map_err(explain)?;
            info!("Attendant {} logged in", username);
            Ok(format!("{}\n", token))
        }
        Command::Queue => Ok(render_queue(&client.list_queue().await.map_err(explain)?)),
        Command::History => Ok(render_history(&client.list_history().await.map_err(explain)?)),
        Command::Register {
            name,
            cpf,
            phone,
            age,
            kind,
        } => {
            let patient = validate_new_patient(name, cpf, phone, age, kind)?;
            client.register_patient(&patient).await.map_err(explain)?;
            info!(
                "Registered patient cpf={} phone={}",
                redact::cpf(&patient.cpf),
                redact::phone_number(&patient.phone)
            );
            Ok("Paciente cadastrado com sucesso!\n".to_string())
        }
        Command::Call { id } => {
            let outcome = client.call_patient(id).await.map_err(explain)?;
            let mut out = String::from("Paciente chamado!\n");
            if let Some(called) = outcome.called {
                out.push_str(&format!(
                    "Chamando {} - {}\n",
                    or_dash(&called.display_code),
                    or_dash(&called.patient_name)
                ));
            }
            if outcome.preferential_rule_applied {
                out.push_str("Regra preferencial aplicada: outro paciente foi chamado.\n");
            }
            Ok(out)
        }
        Command::Finish { id } => {
            client.finish_patient(id).await.map_err(explain)?;
            Ok("Atendimento finalizado!\n".to_string())
        }
        Command::Patient { cpf } => {
            let patient_id = patient_login(client, cpf).await?;
            let status = client.patient_status(&patient_id).await.map_err(explain)?;
            Ok(render_patient_status(&status))
        }
    }
}

async fn patient_login(client: &QueueClient, cpf: &str) -> Result<String> {
    if !redact::is_valid_cpf(cpf) {
        bail!("Digite um CPF válido (11 números).");
    }
    let patient_id = client
        .patient_login(&redact::digits_only(cpf))
        .await
        .map_err(explain)?;
    info!("Patient {} logged in", redact::cpf(cpf));
    Ok(patient_id)
}

/// Log the patient in once, then hand a fresh status page to `emit` every
/// `interval` until `cancel_token` fires. A failed refresh is logged and the
/// previous page stays up.
pub async fn watch_patient<F>(
    client: &QueueClient,
    cpf: &str,
    interval: Duration,
    cancel_token: CancellationToken,
    mut emit: F,
) -> Result<()>
where
    F: FnMut(String),
{
    let patient_id = patient_login(client, cpf).await?;

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    result = client.patient_status(&patient_id) => match result {
                        Ok(status) => emit(render_patient_status(&status)),
                        Err(e) => warn!("Failed to refresh patient status: {}", e),
                    },
                    _ = cancel_token.cancelled() => break,
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }

    debug!("Patient watch stopped");
    Ok(())
}
