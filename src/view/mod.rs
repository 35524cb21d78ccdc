//! Per-view inputs of the hair strands pipeline

pub mod view_data;
pub mod view_operations;

pub use view_data::{PlatformCaps, ScreenRect, ViewInfo, ViewUniform};
pub use view_operations::{
    create_view_info, create_view_uniform, detect_platform_caps, project_aabb_to_screen_rect,
    screen_rect_is_empty, screen_rect_size, screen_rect_union, view_uses_hzb,
};
