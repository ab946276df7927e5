//! Lifecycle phase helpers

use crate::error::{Result, RuntimeError};
use capsule_api::{Bindable, Lifecycle, Phase};
use tracing::{debug, error};

/// Run one lifecycle phase on `target`, wrapping failures
pub(crate) async fn run_phase<T>(target: &mut T, phase: Phase) -> Result<()>
where
    T: Lifecycle + Bindable + ?Sized,
{
    let type_name = target.type_name().to_string();
    let outcome = match phase {
        Phase::Initialise => target.initialise().await,
        Phase::Start => target.start().await,
        Phase::Stop => target.stop().await,
        Phase::Dispose => target.dispose().await,
    };

    match outcome {
        Ok(()) => {
            debug!(target_type = %type_name, phase = %phase, "Lifecycle phase completed");
            Ok(())
        }
        Err(e) => {
            error!(target_type = %type_name, phase = %phase, error = %e, "Lifecycle phase failed");
            Err(RuntimeError::lifecycle(phase, type_name, e))
        }
    }
}

/// Run `phases` in order, stopping at the first failure
pub(crate) async fn run_phases<T>(target: &mut T, phases: &[Phase]) -> Result<()>
where
    T: Lifecycle + Bindable + ?Sized,
{
    for phase in phases {
        run_phase(target, *phase).await?;
    }
    Ok(())
}
