pub mod ffmpeg_video_source;
