pub mod mock;

mod conversion;
mod dispatch;
mod end_to_end;
mod homing;
mod trajectory;
mod twin_race;
