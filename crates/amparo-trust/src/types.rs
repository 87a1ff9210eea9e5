//! Domain and wire types shared across the trust core.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::EncodedEnvelope;

/// Role carried by a principal.
///
/// Names are matched case-insensitively; unknown roles are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RoleRecord", into = "RoleRecord")]
pub enum Role {
    Administrador,
    Operador,
    Other(String),
}

impl Role {
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("administrador") {
            Self::Administrador
        } else if name.eq_ignore_ascii_case("operador") {
            Self::Operador
        } else {
            Self::Other(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Administrador => "Administrador",
            Self::Operador => "Operador",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted shape of a role: `{"name": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoleRecord {
    name: String,
}

impl From<RoleRecord> for Role {
    fn from(record: RoleRecord) -> Self {
        Role::from_name(&record.name)
    }
}

impl From<Role> for RoleRecord {
    fn from(role: Role) -> Self {
        RoleRecord {
            name: role.name().to_string(),
        }
    }
}

/// Authenticated identity snapshot taken at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// User id (numeric or opaque string, kept as text).
    pub id: String,

    /// Full display name.
    pub display_name: String,

    /// Role governing capabilities.
    pub role: Role,

    /// Organizational unit (court) the user belongs to.
    pub org_unit_id: i64,
}

impl Principal {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
        org_unit_id: i64,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
            org_unit_id,
        }
    }
}

/// Authenticated session.
///
/// Only [`crate::SessionManager`] creates and replaces sessions; every other
/// component reads clones.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub principal: Principal,
    pub authenticated: bool,
    pub token: String,
}

impl Session {
    pub fn new(principal: Principal, token: impl Into<String>) -> Self {
        Self {
            principal,
            authenticated: true,
            token: token.into(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("principal", &self.principal)
            .field("authenticated", &self.authenticated)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Protected operations gated by the authorization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewDashboard,
    ViewProfile,
    ManageUsers,
    ManageCases,
    ManageAmparos,
    ManagePromotions,
    ManageParties,
    ManageNotifications,
    SignDocument,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::ViewDashboard,
        Capability::ViewProfile,
        Capability::ManageUsers,
        Capability::ManageCases,
        Capability::ManageAmparos,
        Capability::ManagePromotions,
        Capability::ManageParties,
        Capability::ManageNotifications,
        Capability::SignDocument,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewDashboard => "view_dashboard",
            Self::ViewProfile => "view_profile",
            Self::ManageUsers => "manage_users",
            Self::ManageCases => "manage_cases",
            Self::ManageAmparos => "manage_amparos",
            Self::ManagePromotions => "manage_promotions",
            Self::ManageParties => "manage_parties",
            Self::ManageNotifications => "manage_notifications",
            Self::SignDocument => "sign_document",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login request body for `POST /auth/login`.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub usuario: String,
    pub clave: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("usuario", &self.usuario)
            .field("clave", &"<redacted>")
            .finish()
    }
}

impl LoginRequest {
    pub fn new(usuario: impl Into<String>, clave: impl Into<String>) -> Self {
        Self {
            usuario: usuario.into(),
            clave: clave.into(),
        }
    }
}

/// Generic `{success, message, data}` response wrapper used by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(default)]
    pub message: Option<String>,

    pub data: Option<T>,
}

/// `data` payload of a successful login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub user: BackendUser,
    pub token: String,

    /// Token lifetime as reported by the backend (e.g. `"24h"`).
    #[serde(default)]
    pub expires_in: Option<serde_json::Value>,
}

/// Identifier as sent by the backend: number or encrypted string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BackendId {
    Number(i64),
    Text(String),
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Profile record nested in the backend user.
#[derive(Debug, Clone, Deserialize)]
pub struct Perfil {
    pub nombre: String,
}

/// User record returned by the backend at login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendUser {
    pub id_usuario: BackendId,

    #[serde(default)]
    pub nombre: String,

    #[serde(default)]
    pub ap_paterno: String,

    #[serde(default)]
    pub ap_materno: String,

    #[serde(default)]
    pub organo_impartidor_justicia: i64,

    pub perfil: Perfil,
}

impl BackendUser {
    /// Snapshot the backend record as a principal.
    pub fn to_principal(&self) -> Principal {
        let display_name = [
            self.nombre.as_str(),
            self.ap_paterno.as_str(),
            self.ap_materno.as_str(),
        ]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Principal {
            id: self.id_usuario.to_string(),
            display_name,
            role: Role::from_name(&self.perfil.nombre),
            org_unit_id: self.organo_impartidor_justicia,
        }
    }
}

/// Document state as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocumentState {
    pub document_id: String,

    /// Whether an accepted envelope exists.
    pub signed: bool,

    /// The accepted envelope, when the backend returns it.
    pub envelope: Option<EncodedEnvelope>,
}

impl StoredDocumentState {
    pub fn unsigned(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            signed: false,
            envelope: None,
        }
    }
}

/// `data` payload of the document lookup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id_documento_notificacion: BackendId,

    #[serde(default)]
    pub firmado: bool,

    #[serde(default)]
    pub pkcs7_base64: Option<String>,
}

impl DocumentRecord {
    /// Stored state; an empty envelope field counts as absent.
    pub fn into_state(self) -> StoredDocumentState {
        let envelope = self
            .pkcs7_base64
            .filter(|e| !e.trim().is_empty())
            .map(EncodedEnvelope::new);

        StoredDocumentState {
            document_id: self.id_documento_notificacion.to_string(),
            signed: self.firmado,
            envelope,
        }
    }
}

/// Body of the document-signing submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSubmission {
    pub document_id: String,
    pub signer_id: String,
    pub signer_name: String,
    pub org_unit_id: i64,
    pub signed_at_utc: DateTime<Utc>,
    pub digest_hex: String,
    pub observations: String,

    /// Encoded envelope (the durable proof artifact).
    pub envelope: EncodedEnvelope,
}
