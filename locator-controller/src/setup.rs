use crate::motion_gateway::{HardwareError, MotionGateway};
use thiserror::Error;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("setup handshake failed")]
    Hardware(#[from] HardwareError),
    #[error("setup task ended without reporting")]
    Aborted,
}

type Result<T> = std::result::Result<T, SetupError>;

/// Pending setup of a gateway running on a background task
pub struct SetupHandle {
    receiver: oneshot::Receiver<Result<Box<dyn MotionGateway>>>,
}

/// Runs the slow setup handshake without blocking the caller.
/// The task owns the gateway until it hands it back.
pub fn spawn_setup(mut gateway: Box<dyn MotionGateway>) -> SetupHandle {
    let (sender, receiver) = oneshot::channel();
    tokio::spawn(async move {
        info!("setting up motion backend");
        let result = match gateway.setup().await {
            Ok(()) => {
                info!("motion backend ready");
                Ok(gateway)
            }
            Err(err) => {
                error!(%err, "motion backend setup failed");
                Err(SetupError::Hardware(err))
            }
        };
        // receiver may be gone if the caller gave up
        let _ = sender.send(result);
    });
    SetupHandle { receiver }
}

impl SetupHandle {
    pub async fn wait(self) -> Result<Box<dyn MotionGateway>> {
        self.receiver.await.map_err(|_| SetupError::Aborted)?
    }

    /// `None` while setup is still running
    pub fn try_finish(&mut self) -> Option<Result<Box<dyn MotionGateway>>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(SetupError::Aborted)),
        }
    }
}
