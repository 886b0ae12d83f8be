pub mod core {
    pub mod cli;
    pub mod config;
    pub mod error;
    pub mod executor;
    pub mod output;
    pub mod runner;
    pub mod tracing_init;
}

pub mod api {
    pub mod client;
    pub mod daemon;
}

pub mod engine {
    pub mod compiler;
    pub mod formula;
    pub mod planner;
    pub mod retention;
    pub mod seed_time;
}

pub mod models {
    pub mod plan;
    pub mod rule;
    pub mod torrent;
}

pub mod utils {
    pub mod maps;
    pub mod size;
    pub mod time;
}
