#![doc = include_str!("../README.md")]

mod bits;
mod calibration;
mod codec;
mod content;
pub mod database;
mod entry_value;
mod error;
pub mod model;
pub mod spacepacket;
mod stream;
pub mod timecode;
mod value;

pub use bits::RawBits;
pub use calibration::{Calibration, CalibrationError, Calibrator};
pub use codec::ItemCodec;
pub use content::{
    ContainerContentModel, ContentEntry, ContentProcessor, EntryKind, ProcessOptions,
};
pub use database::{
    ArgumentId, CommandId, ContainerId, Database, ItemId, ParameterId, StreamId, TypeId,
};
pub use entry_value::{ComparisonOperator, ContainerEntryValue, NoValues, ValueForm, ValueLookup};
pub use error::{Error, ObjectKind, Result};
pub use stream::StreamProcessor;
pub use value::{DecodedValue, Outcome, Value};
