//! Glue around the opaque fee/priority estimator.
//!
//! The pool only forwards observations; the statistical model lives behind
//! [`FeeEstimator`]. The file framing here is the only serialisation the pool
//! owns: a minimum reader version, the writer's version, then the estimator's
//! bytes.

use crate::arena::MempoolEntry;
use crate::types::FeeRate;
use obscura_primitives::{TxId, CLIENT_VERSION};

use std::io::{self, Read, Write};

/// Minimum client version able to read the fee-estimates file.
pub const FEE_ESTIMATES_VERSION_REQUIRED: i32 = 109_900;

/// Observer of pool admissions and block confirmations.
pub trait FeeEstimator: Send + Sync {
    /// A transaction entered the pool.
    fn process_transaction(&mut self, entry: &MempoolEntry, current_estimate: bool);

    /// A block at `height` confirmed `entries`, which were pool members.
    fn process_block(&mut self, height: u32, entries: &[MempoolEntry], current_estimate: bool);

    /// A transaction left the pool unconfirmed.
    fn remove_tx(&mut self, txid: &TxId);

    /// Estimated fee rate to confirm within `blocks` blocks.
    fn estimate_fee(&self, blocks: usize) -> FeeRate;

    /// Estimated priority to confirm within `blocks` blocks.
    fn estimate_priority(&self, blocks: usize) -> f64;

    /// Serialise the model.
    fn write(&self, out: &mut dyn Write) -> io::Result<()>;

    /// Restore the model from its serialised form.
    fn read(&mut self, input: &mut dyn Read) -> io::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum EstimatesFileError {
    #[error("fee estimate file requires client version {required}, running {running}")]
    UpVersion { required: i32, running: i32 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub(crate) fn write_estimates(
    estimator: &dyn FeeEstimator,
    out: &mut dyn Write,
) -> Result<(), EstimatesFileError> {
    out.write_all(&FEE_ESTIMATES_VERSION_REQUIRED.to_le_bytes())?;
    out.write_all(&CLIENT_VERSION.to_le_bytes())?;
    estimator.write(out)?;
    Ok(())
}

pub(crate) fn read_estimates(
    estimator: &mut dyn FeeEstimator,
    input: &mut dyn Read,
) -> Result<(), EstimatesFileError> {
    let mut word = [0u8; 4];
    input.read_exact(&mut word)?;
    let version_required = i32::from_le_bytes(word);
    input.read_exact(&mut word)?;
    let _version_that_wrote = i32::from_le_bytes(word);

    if version_required > CLIENT_VERSION {
        return Err(EstimatesFileError::UpVersion {
            required: version_required,
            running: CLIENT_VERSION,
        });
    }

    estimator.read(input)?;
    Ok(())
}
