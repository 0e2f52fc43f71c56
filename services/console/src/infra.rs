use device_wizard::auth::{OidcClient, SessionStore};
use device_wizard::config::{PlatformConfig, PortalConfig};
use device_wizard::datamodel::Datamodel;
use device_wizard::error::AppError;
use device_wizard::fiware::{IotAgentClient, OrionClient};
use device_wizard::forms::FormService;
use device_wizard::idm::DeviceIdmClient;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

pub(crate) const SESSION_COOKIE: &str = "device_wizard_session";

/// Backends and models shared by every request.
pub(crate) struct Console {
    pub(crate) orion: OrionClient,
    pub(crate) iotagent: IotAgentClient,
    pub(crate) idm: DeviceIdmClient,
    pub(crate) datamodel: Datamodel,
    pub(crate) forms: FormService,
    pub(crate) portal: PortalConfig,
    pub(crate) fiware_service: String,
    pub(crate) oidc: Option<OidcClient>,
    pub(crate) sessions: SessionStore,
}

impl Console {
    pub(crate) fn from_platform(platform: &PlatformConfig) -> Result<Self, AppError> {
        let orion = OrionClient::new(&platform.fiware)?;
        let iotagent = IotAgentClient::new(&platform.fiware)?;
        let idm = DeviceIdmClient::new(&platform.device_idm)?;
        let datamodel = Datamodel::load(&platform.datamodel)?;

        let oidc = platform.oidc.clone().map(OidcClient::new);
        if oidc.is_none() {
            warn!("no oidc section configured; console pages are open to everyone");
        }

        Ok(Self {
            forms: FormService::new(orion.clone()),
            orion,
            iotagent,
            idm,
            datamodel,
            portal: platform.idm.clone(),
            fiware_service: platform.fiware.fiware_service.clone(),
            oidc,
            sessions: SessionStore::default(),
        })
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) console: Arc<Console>,
}

impl AppState {
    pub(crate) fn new(console: Console) -> Self {
        Self {
            readiness: Arc::new(AtomicBool::new(false)),
            console: Arc::new(console),
        }
    }
}
