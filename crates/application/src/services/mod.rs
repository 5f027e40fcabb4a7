mod call_relay;
mod message_broker;
mod room_service;


pub use call_relay::{
    CallCreation, CallRelay, CallRelayDependencies, CallSettings, CreateCallRequest,
};
pub use message_broker::{
    HistoryLimits, MessageBroker, MessageBrokerDependencies, PostedMessage,
};
pub use room_service::{CreateRoomRequest, RoomCreation, RoomService, RoomServiceDependencies};
