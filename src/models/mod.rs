pub mod barber;
pub mod booking;
pub mod client;
pub mod schedule;
pub mod service;
pub mod settings;

pub use barber::Barber;
pub use booking::{Booking, BookingStatus};
pub use client::Client;
pub use schedule::{AvailabilityRule, BarberTimeOff, TimeBlock};
pub use service::Service;
pub use settings::ShopSettings;
