//! User-facing strings for the deployment language
//!
//! Log output stays in English; everything a patient can read or hear goes
//! through a [`Strings`] table selected by [`Locale`].

use std::fmt;
use std::str::FromStr;

use crate::conversation::ConversationError;

/// Deployment language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    /// Brazilian Portuguese
    #[default]
    PtBr,
    /// English
    En,
}

impl Locale {
    /// BCP 47 tag handed to the platform recognizer
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::PtBr => "pt-BR",
            Self::En => "en-US",
        }
    }

    /// Voice name for `espeak-ng` style synthesizers
    #[must_use]
    pub const fn synthesis_voice(self) -> &'static str {
        match self {
            Self::PtBr => "pt-br",
            Self::En => "en-us",
        }
    }

    /// String table for this locale
    #[must_use]
    pub const fn strings(self) -> &'static Strings {
        match self {
            Self::PtBr => &PT_BR,
            Self::En => &EN,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "pt" | "pt-br" => Ok(Self::PtBr),
            "en" | "en-us" | "en-gb" => Ok(Self::En),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

/// Localized text shown or spoken to the patient
#[derive(Debug)]
pub struct Strings {
    pub capture_unsupported: &'static str,
    pub capture_unavailable: &'static str,
    pub recognition_failed: &'static str,
    pub recording_start_failed: &'static str,
    pub timeout: &'static str,
    pub server_error: &'static str,
    pub connection_refused: &'static str,
    pub communication_error: &'static str,
    pub opening_failed_title: &'static str,
    pub exchange_failed_title: &'static str,
    pub emergency_banner: &'static str,
    pub welcome_title: &'static str,
    pub welcome_hint: &'static str,
    pub connecting: &'static str,
    pub processing: &'static str,
    pub speaking: &'static str,
    pub recording: &'static str,
    pub idle: &'static str,
    pub finalize: &'static str,
    pub unlock: &'static str,
    pub patient_label: &'static str,
    pub assistant_label: &'static str,
    pub recording_unavailable: &'static str,
    opening_failed: &'static str,
    exchange_failed: &'static str,
    countdown: &'static str,
}

impl Strings {
    /// User-facing text for a conversation backend failure
    #[must_use]
    pub fn conversation_error(&self, err: &ConversationError) -> &'static str {
        match err {
            ConversationError::Timeout => self.timeout,
            ConversationError::Server(_) => self.server_error,
            ConversationError::ConnectionRefused => self.connection_refused,
            ConversationError::Communication(_) => self.communication_error,
        }
    }

    /// Assistant-authored chat message for a failed opening exchange
    #[must_use]
    pub fn opening_failed(&self, reason: &str) -> String {
        self.opening_failed.replace("{reason}", reason)
    }

    /// Assistant-authored chat message for a failed exchange
    #[must_use]
    pub fn exchange_failed(&self, reason: &str) -> String {
        self.exchange_failed.replace("{reason}", reason)
    }

    /// Countdown line shown before returning to the welcome screen
    #[must_use]
    pub fn countdown(&self, seconds: u32) -> String {
        self.countdown.replace("{seconds}", &seconds.to_string())
    }
}

static PT_BR: Strings = Strings {
    capture_unsupported: "Reconhecimento de voz não é suportado neste dispositivo",
    capture_unavailable: "Reconhecimento de voz não disponível",
    recognition_failed: "Erro no reconhecimento de voz. Tente novamente.",
    recording_start_failed: "Erro ao iniciar gravação",
    timeout: "Timeout: O servidor demorou muito para responder",
    server_error: "Erro interno do servidor",
    connection_refused: "Não foi possível conectar ao servidor",
    communication_error: "Erro de comunicação com o servidor",
    opening_failed_title: "Erro ao iniciar conversa",
    exchange_failed_title: "Erro de comunicação",
    emergency_banner: "ATENÇÃO: SITUAÇÃO DE URGÊNCIA DETECTADA. A EQUIPE FOI ACIONADA.",
    welcome_title: "Triagem Virtual por Voz",
    welcome_hint: "Pressione Enter para iniciar o atendimento",
    connecting: "Conectando com a assistente...",
    processing: "Processando...",
    speaking: "Falando...",
    recording: "Gravando - pressione Enter para parar",
    idle: "Pressione Enter para falar",
    finalize: "Finalizar Atendimento",
    unlock: "Destravar botão",
    patient_label: "Você",
    assistant_label: "Assistente",
    recording_unavailable: "Gravação indisponível no momento",
    opening_failed: "Desculpe, ocorreu um erro ao iniciar a conversa: {reason}. Tente novamente.",
    exchange_failed: "Desculpe, ocorreu um erro: {reason}. Tente novamente em alguns instantes.",
    countdown: "Retornando à tela principal em: {seconds} segundos",
};

static EN: Strings = Strings {
    capture_unsupported: "Speech recognition is not supported on this device",
    capture_unavailable: "Speech recognition unavailable",
    recognition_failed: "Speech recognition error. Please try again.",
    recording_start_failed: "Could not start recording",
    timeout: "Timeout: the server took too long to respond",
    server_error: "Internal server error",
    connection_refused: "Could not connect to the server",
    communication_error: "Error communicating with the server",
    opening_failed_title: "Could not start the conversation",
    exchange_failed_title: "Communication error",
    emergency_banner: "ATTENTION: URGENT SITUATION DETECTED. THE TEAM HAS BEEN NOTIFIED.",
    welcome_title: "Virtual Voice Triage",
    welcome_hint: "Press Enter to start",
    connecting: "Connecting to the assistant...",
    processing: "Processing...",
    speaking: "Speaking...",
    recording: "Recording - press Enter to stop",
    idle: "Press Enter to speak",
    finalize: "Finish",
    unlock: "Unlock controls",
    patient_label: "You",
    assistant_label: "Assistant",
    recording_unavailable: "Recording is not available right now",
    opening_failed: "Sorry, something went wrong starting the conversation: {reason}. Please try again.",
    exchange_failed: "Sorry, something went wrong: {reason}. Please try again in a moment.",
    countdown: "Returning to the main screen in: {seconds} seconds",
};
