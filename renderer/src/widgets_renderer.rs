pub mod texture_color;
