pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod model_resolver;
    pub mod player_slot;
    pub mod snapshot;
}

pub mod detection {
    pub mod domain {
        pub mod detected_face;
        pub mod expression_detector;
        pub mod player_assignment;
        pub mod smile_estimator;
    }
    pub mod infrastructure;
}

pub mod distortion {
    pub mod domain {
        pub mod distortion_state;
        pub mod frame_distorter;
    }
    pub mod infrastructure;
}

pub mod game {
    pub mod domain {
        pub mod game_config;
        pub mod game_session;
    }
}

pub mod video {
    pub mod domain {
        pub mod video_source;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod frame_loop;
    pub mod pipeline_logger;
    pub mod tick_scheduler;
}
