pub mod fetch;
pub mod output;
pub mod parser;
pub mod poller;
pub mod projector;
pub mod schedule;
pub mod server;
pub mod vehicle;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
