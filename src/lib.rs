pub mod api_router;
pub mod booking;
pub mod shared;
