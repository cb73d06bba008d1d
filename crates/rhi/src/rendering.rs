//! Dynamic rendering attachments (Vulkan 1.3).
//!
//! Every pass in the frame pipeline opens a rendering scope from a
//! [`RenderingConfig`]: up to four color attachments (the G-buffer) and an
//! optional depth attachment. Shadow and normal/depth passes use depth only.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use prism_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
//!
//! # fn example(color: vk::ImageView, depth: vk::ImageView) {
//! let config = RenderingConfig::new(vk::Extent2D { width: 800, height: 600 })
//!     .with_color_attachment(ColorAttachment::new(color).with_clear_color([0.69, 0.77, 0.87, 1.0]))
//!     .with_depth_attachment(DepthAttachment::new(depth).with_clear_depth(1.0));
//! let bundle = config.build();
//! let info = bundle.info();
//! # }
//! ```

use ash::vk;

/// A color target for one rendering scope.
#[derive(Clone, Copy, Debug)]
pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

impl ColorAttachment {
    /// Clears to opaque black and stores.
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self
    }

    /// Keeps the existing contents (the sky pass draws over the lit scene).
    pub fn load(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self
    }

    fn to_vk(self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
    }
}

/// A depth target for one rendering scope.
#[derive(Clone, Copy, Debug)]
pub struct DepthAttachment {
    pub image_view: vk::ImageView,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_depth: f32,
}

impl DepthAttachment {
    /// Clears to 1.0 and stores, since later passes sample most depth targets.
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_depth: 1.0,
        }
    }

    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_depth = depth;
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self
    }

    pub fn load(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self
    }

    fn to_vk(self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Attachments and render area of one rendering scope.
#[derive(Clone, Debug)]
pub struct RenderingConfig {
    extent: vk::Extent2D,
    color_attachments: Vec<ColorAttachment>,
    depth_attachment: Option<DepthAttachment>,
}

impl RenderingConfig {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            extent,
            color_attachments: Vec::new(),
            depth_attachment: None,
        }
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_color_attachments(
        mut self,
        attachments: impl IntoIterator<Item = ColorAttachment>,
    ) -> Self {
        self.color_attachments.extend(attachments);
        self
    }

    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn color_count(&self) -> usize {
        self.color_attachments.len()
    }

    pub fn has_depth(&self) -> bool {
        self.depth_attachment.is_some()
    }

    /// Converts to Vulkan structs that stay alive as long as the bundle.
    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            },
            color_attachments: self
                .color_attachments
                .iter()
                .map(|a| a.to_vk())
                .collect(),
            depth_attachment: self.depth_attachment.map(DepthAttachment::to_vk),
        }
    }
}

/// Owns the attachment infos a `vk::RenderingInfo` points into.
pub struct RenderingInfoBundle {
    render_area: vk::Rect2D,
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);
        match &self.depth_attachment {
            Some(depth) => info.depth_attachment(depth),
            None => info,
        }
    }

    pub fn color_attachments(&self) -> &[vk::RenderingAttachmentInfo<'static>] {
        &self.color_attachments
    }

    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1920,
        height: 1080,
    };

    #[test]
    fn test_color_attachment_defaults() {
        let attachment = ColorAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(
            ColorAttachment::new(vk::ImageView::null()).load().load_op,
            vk::AttachmentLoadOp::LOAD
        );
    }

    #[test]
    fn test_depth_only_config() {
        let config = RenderingConfig::new(EXTENT)
            .with_depth_attachment(DepthAttachment::new(vk::ImageView::null()));
        assert_eq!(config.color_count(), 0);
        assert!(config.has_depth());

        let bundle = config.build();
        let info = bundle.info();
        assert_eq!(info.color_attachment_count, 0);
        assert!(!info.p_depth_attachment.is_null());
        assert_eq!(bundle.render_area().extent.width, 1920);
    }

    #[test]
    fn test_gbuffer_config() {
        let config = RenderingConfig::new(EXTENT)
            .with_color_attachments([ColorAttachment::new(vk::ImageView::null()); 4])
            .with_depth_attachment(DepthAttachment::new(vk::ImageView::null()));
        let bundle = config.build();
        assert_eq!(bundle.color_attachments().len(), 4);
        assert_eq!(bundle.info().color_attachment_count, 4);
    }

    #[test]
    fn test_clear_values() {
        let bundle = RenderingConfig::new(EXTENT)
            .with_color_attachment(
                ColorAttachment::new(vk::ImageView::null()).with_clear_color([0.5, 0.25, 0.0, 1.0]),
            )
            .build();
        let clear = unsafe { bundle.color_attachments()[0].clear_value.color.float32 };
        assert_eq!(clear, [0.5, 0.25, 0.0, 1.0]);
    }
}
