//! Shared types of the data viewer backend: the column-oriented dataset
//! model with its row-window slicing, the viewer wire protocol, and the
//! channel traits transports implement.

pub mod channel;
pub mod dataset;
pub mod error;
pub mod protocol;
pub mod value;

pub use channel::{Channel, ChannelFactory, MessageHandler};
pub use dataset::{ColumnView, DataColumn, Dataset, DatasetWindow};
pub use error::{ChannelError, DatasetError, InvalidRange, ProtocolError};
pub use protocol::{
    clean, InboundMessage, InboundTag, OutboundMessage, OutboundTag, ResponseTag, RowWindow,
    DEFAULT_FETCH_SIZE, DEFAULT_START_ROW,
};
pub use value::CellValue;
