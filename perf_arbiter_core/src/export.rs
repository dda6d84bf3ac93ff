//! Version-tagged arbitration output handed to host and driver layers.
//!
//! The header names the payload layout so a generic consumer can pick the
//! right decoder without knowing the arbiter's in-memory types.

use serde::{Deserialize, Serialize};

use crate::error::{PerfError, Result};
use crate::types::{ArbitrationOutput, BoundTuple, MAX_CLK_DOMAINS, MAX_VOLT_RAILS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ArbOutputVersion {
    V1 = 1,
}

impl ArbOutputVersion {
    pub const LATEST: Self = ArbOutputVersion::V1;

    pub fn from_u32(v: u32) -> Result<Self> {
        match v {
            1 => Ok(ArbOutputVersion::V1),
            _ => Err(PerfError::InvalidArgument("unknown arbitration output version")),
        }
    }

    /// Encoded payload length in bytes.
    pub const fn payload_len(self) -> usize {
        match self {
            // pstates, masks, stamp, then four u32 arrays
            ArbOutputVersion::V1 => 4 * 4 + 8 + 4 * (2 * MAX_CLK_DOMAINS + 2 * MAX_VOLT_RAILS),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportHeader {
    pub version: ArbOutputVersion,
    /// Payload size in bytes.
    pub size: u32,
}

/// V1 payload: both tuples plus the wire form of the touched masks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbOutputV1 {
    pub min: BoundTuple,
    pub max: BoundTuple,
    pub domain_mask: u32,
    pub rail_mask: u32,
    pub sequence_stamp: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportPayload {
    V1(ArbOutputV1),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationOutputExport {
    pub header: ExportHeader,
    pub payload: ExportPayload,
}

impl ArbitrationOutputExport {
    pub fn new(output: &ArbitrationOutput, version: ArbOutputVersion) -> Result<Self> {
        let payload = match version {
            ArbOutputVersion::V1 => {
                let mut domain_mask = [0u32; 1];
                output.domain_mask.export_to(&mut domain_mask, MAX_CLK_DOMAINS)?;
                let mut rail_mask = [0u32; 1];
                output.rail_mask.export_to(&mut rail_mask, MAX_VOLT_RAILS)?;
                ExportPayload::V1(ArbOutputV1 {
                    min: output.min,
                    max: output.max,
                    domain_mask: domain_mask[0],
                    rail_mask: rail_mask[0],
                    sequence_stamp: output.sequence_stamp,
                })
            }
        };
        Ok(Self {
            header: ExportHeader {
                version,
                size: version.payload_len() as u32,
            },
            payload,
        })
    }

    pub fn version(&self) -> ArbOutputVersion {
        self.header.version
    }
}

impl TryFrom<&ArbitrationOutput> for ArbitrationOutputExport {
    type Error = PerfError;

    fn try_from(output: &ArbitrationOutput) -> Result<Self> {
        Self::new(output, ArbOutputVersion::LATEST)
    }
}
