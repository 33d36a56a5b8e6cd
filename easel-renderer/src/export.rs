//! Scene export to SVG and raster formats.
//!
//! SVG export walks the scene once, accumulating `<defs>` (font faces,
//! gradient and pattern fillers, clip paths) alongside the body markup.
//! Raster export renders the scene into a standalone pixmap, restoring
//! every temporarily mutated canvas property afterwards.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use easel_core::config::RenderConfig;
use easel_core::entity::{Entity, EntityKind, FillRuleKind, LineCap, LineJoin, PaintFirst};
use easel_core::gradient::next_svg_id;
use easel_core::matrix::to_svg_attribute;
use easel_core::paint::Paint;
use easel_core::scheduler::RenderScheduler;
use easel_core::shapes::local_path;
use image::codecs::jpeg::JpegEncoder;
use image::ImageEncoder as _;
use kurbo::{Affine, Rect};
use tiny_skia::Pixmap;

use crate::cache::CacheManager;
use crate::canvas::StaticCanvas;
use crate::draw::render_entity;
use crate::error::{RenderError, RenderResult};
use crate::painter::Painter as _;
use crate::pixmap::PixmapPainter;

/// Options for SVG export.
#[derive(Debug, Clone, Default)]
pub struct SvgOptions {
    /// Skip the XML declaration and doctype.
    pub suppress_preamble: bool,
    /// Explicit view box; defaults to the viewport-transformed scene, or
    /// the raw dimensions for an identity viewport.
    pub viewbox: Option<Rect>,
    /// Width attribute override.
    pub width: Option<f64>,
    /// Height attribute override.
    pub height: Option<f64>,
}

/// Callback rewriting each entity's SVG fragment before it is appended.
pub type SvgReviver<'a> = &'a dyn Fn(&Entity, String) -> String;

/// Options for raster export.
#[derive(Debug, Clone)]
pub struct RasterOptions {
    /// Output scale; 2.0 doubles both dimensions.
    pub multiplier: f64,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            jpeg_quality: 85,
        }
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

struct SvgBuilder<'a> {
    config: &'a RenderConfig,
    reviver: Option<SvgReviver<'a>>,
    defs: String,
}

impl SvgBuilder<'_> {
    fn num(&self, value: f64) -> f64 {
        self.config.round(value)
    }

    fn revive(&self, entity: &Entity, fragment: String) -> String {
        match self.reviver {
            Some(revive) => revive(entity, fragment),
            None => fragment,
        }
    }

    fn paint_attr(&mut self, paint: &Paint, bounds: Rect) -> String {
        match paint {
            Paint::None => "none".to_string(),
            Paint::Color(c) => c.clone(),
            Paint::Gradient(g) => {
                self.defs.push_str(&g.to_svg(bounds));
                format!("url(#{})", g.id)
            }
            Paint::Pattern(p) => {
                self.defs.push_str(&p.to_svg());
                format!("url(#{})", p.id)
            }
        }
    }

    fn style_attrs(&mut self, entity: &Entity) -> String {
        let bounds = entity.local_bounds();
        let mut attrs = String::new();
        let fill = self.paint_attr(&entity.fill, bounds);
        let _ = write!(attrs, " fill=\"{fill}\"");
        if entity.fill_rule == FillRuleKind::EvenOdd {
            attrs.push_str(" fill-rule=\"evenodd\"");
        }
        if !entity.stroke.is_none() {
            let stroke = self.paint_attr(&entity.stroke, bounds);
            let _ = write!(
                attrs,
                " stroke=\"{stroke}\" stroke-width=\"{}\"",
                self.num(entity.stroke_width)
            );
            let cap = match entity.stroke_line_cap {
                LineCap::Butt => "butt",
                LineCap::Round => "round",
                LineCap::Square => "square",
            };
            let join = match entity.stroke_line_join {
                LineJoin::Miter => "miter",
                LineJoin::Round => "round",
                LineJoin::Bevel => "bevel",
            };
            let _ = write!(
                attrs,
                " stroke-linecap=\"{cap}\" stroke-linejoin=\"{join}\" stroke-miterlimit=\"{}\"",
                self.num(entity.stroke_miter_limit)
            );
            if !entity.stroke_dash_array.is_empty() {
                let dashes: Vec<String> = entity
                    .stroke_dash_array
                    .iter()
                    .map(|v| self.num(*v).to_string())
                    .collect();
                let _ = write!(attrs, " stroke-dasharray=\"{}\"", dashes.join(" "));
            }
            if entity.stroke_dash_offset != 0.0 {
                let _ = write!(
                    attrs,
                    " stroke-dashoffset=\"{}\"",
                    self.num(entity.stroke_dash_offset)
                );
            }
        }
        if entity.paint_first == PaintFirst::Stroke {
            attrs.push_str(" paint-order=\"stroke\"");
        }
        if entity.opacity < 1.0 {
            let _ = write!(attrs, " opacity=\"{}\"", self.num(entity.opacity));
        }
        attrs
    }

    /// Markup for one entity, accumulating defs on the side.
    #[allow(clippy::too_many_lines)]
    fn entity_markup(&mut self, entity: &Entity) -> String {
        if entity.exclude_from_export || !entity.visible {
            return String::new();
        }
        let digits = self.config.num_fraction_digits;
        let mut clip_attr = String::new();
        if let Some(clip) = &entity.clip_path {
            let id = next_svg_id();
            let mut def = format!("<clipPath id=\"{id}\">");
            def.push_str(&self.silhouette_markup(&clip.entity));
            def.push_str("</clipPath>");
            self.defs.push_str(&def);
            let _ = write!(clip_attr, " clip-path=\"url(#{id})\"");
        }
        let transform = to_svg_attribute(entity.own_matrix(), digits);
        let style = self.style_attrs(entity);
        let hw = self.num(entity.width / 2.0);
        let hh = self.num(entity.height / 2.0);
        let markup = match &entity.kind {
            EntityKind::Rect { rx, ry } => {
                let mut radii = String::new();
                if *rx > 0.0 || *ry > 0.0 {
                    let _ = write!(radii, " rx=\"{}\" ry=\"{}\"", self.num(*rx), self.num(*ry));
                }
                format!(
                    "<rect x=\"-{hw}\" y=\"-{hh}\" width=\"{}\" height=\"{}\"{radii}{style} transform=\"{transform}\"{clip_attr}/>",
                    self.num(entity.width),
                    self.num(entity.height),
                )
            }
            EntityKind::Ellipse => format!(
                "<ellipse cx=\"0\" cy=\"0\" rx=\"{hw}\" ry=\"{hh}\"{style} transform=\"{transform}\"{clip_attr}/>"
            ),
            EntityKind::Path { path, path_offset } => {
                let centered =
                    to_svg_attribute(
                        entity.own_matrix() * Affine::translate((-path_offset.x, -path_offset.y)),
                        digits,
                    );
                format!(
                    "<path d=\"{}\"{style} transform=\"{centered}\"{clip_attr}/>",
                    path.to_svg()
                )
            }
            EntityKind::Image { src, .. } => format!(
                "<image x=\"-{hw}\" y=\"-{hh}\" width=\"{}\" height=\"{}\" href=\"{}\"{style} transform=\"{transform}\"{clip_attr}/>",
                self.num(entity.width),
                self.num(entity.height),
                xml_escape(src),
            ),
            EntityKind::Text {
                text,
                font_family,
                font_size,
                ..
            } => format!(
                "<text x=\"-{hw}\" y=\"{}\" font-family=\"{}\" font-size=\"{}\"{style} transform=\"{transform}\"{clip_attr}>{}</text>",
                self.num(-entity.height / 2.0 + font_size),
                xml_escape(font_family),
                self.num(*font_size),
                xml_escape(text),
            ),
            EntityKind::Group { children } => {
                let mut body = format!("<g{style} transform=\"{transform}\"{clip_attr}>");
                for child in children {
                    body.push_str(&self.entity_markup(child));
                }
                body.push_str("</g>");
                body
            }
        };
        self.revive(entity, markup)
    }

    /// Bare outline markup used inside `<clipPath>` definitions.
    fn silhouette_markup(&mut self, entity: &Entity) -> String {
        let digits = self.config.num_fraction_digits;
        if let Some(path) = local_path(entity) {
            let transform = to_svg_attribute(entity.own_matrix(), digits);
            return format!(
                "<path d=\"{}\" transform=\"{transform}\"/>",
                path.to_svg()
            );
        }
        if let EntityKind::Group { children } = &entity.kind {
            let transform = to_svg_attribute(entity.own_matrix(), digits);
            let mut body = format!("<g transform=\"{transform}\">");
            for child in children {
                body.push_str(&self.silhouette_markup(child));
            }
            body.push_str("</g>");
            return body;
        }
        String::new()
    }
}

/// Render a single entity into its own tightly sized pixmap.
///
/// The output covers the entity's transformed bounding box, scaled by the
/// multiplier, with the entity drawn as if alone on a transparent surface.
/// The entity itself is left unchanged apart from its cache dirty flag.
///
/// # Errors
///
/// Returns [`RenderError::Surface`] for an unusable output size, or any
/// render pass failure.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rasterize_entity(
    entity: &mut Entity,
    config: &RenderConfig,
    options: &RasterOptions,
) -> RenderResult<Pixmap> {
    let bounds = entity.bounding_box(Affine::IDENTITY);
    let multiplier = options.multiplier;
    let out_w = (bounds.width() * multiplier).ceil().max(1.0) as u32;
    let out_h = (bounds.height() * multiplier).ceil().max(1.0) as u32;
    let mut painter = PixmapPainter::new(out_w, out_h)?;
    painter.set_transform(
        Affine::scale(multiplier) * Affine::translate((-bounds.x0, -bounds.y0)),
    );
    let mut cache = CacheManager::new();
    render_entity(&mut painter, entity, &mut cache, config, None, 1.0)?;
    Ok(painter.into_pixmap())
}

/// Collect the font families used by text entities, recursing into groups
/// and clip paths.
fn collect_font_families(entities: &[&Entity], out: &mut BTreeSet<String>) {
    for entity in entities {
        match &entity.kind {
            EntityKind::Text { font_family, .. } => {
                out.insert(font_family.clone());
            }
            EntityKind::Group { children } => {
                let refs: Vec<&Entity> = children.iter().collect();
                collect_font_families(&refs, out);
            }
            _ => {}
        }
        if let Some(clip) = &entity.clip_path {
            collect_font_families(&[clip.entity.as_ref()], out);
        }
    }
}

impl<S: RenderScheduler> StaticCanvas<S> {
    /// Export the scene as an SVG document.
    #[must_use]
    pub fn to_svg(&self, options: &SvgOptions, reviver: Option<SvgReviver<'_>>) -> String {
        let mut builder = SvgBuilder {
            config: &self.config,
            reviver,
            defs: String::new(),
        };
        let mut body = String::new();
        if !self.background_color.is_none() {
            let fill = builder.paint_attr(
                &self.background_color,
                Rect::new(0.0, 0.0, self.width, self.height),
            );
            let _ = write!(
                body,
                "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"{fill}\"/>",
                self.width, self.height,
            );
        }
        if let Some(background) = &self.background_image {
            body.push_str(&builder.entity_markup(background));
        }

        let mut entities_markup = String::new();
        for entity in &self.entities {
            entities_markup.push_str(&builder.entity_markup(entity));
        }
        if let Some(clip) = &self.clip_path {
            let id = next_svg_id();
            let mut def = format!("<clipPath id=\"{id}\">");
            def.push_str(&builder.silhouette_markup(&clip.entity));
            def.push_str("</clipPath>");
            builder.defs.push_str(&def);
            let _ = write!(
                body,
                "<g clip-path=\"url(#{id})\">{entities_markup}</g>"
            );
        } else {
            body.push_str(&entities_markup);
        }

        if !self.overlay_color.is_none() {
            let fill = builder.paint_attr(
                &self.overlay_color,
                Rect::new(0.0, 0.0, self.width, self.height),
            );
            let _ = write!(
                body,
                "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"{fill}\"/>",
                self.width, self.height,
            );
        }
        if let Some(overlay) = &self.overlay_image {
            body.push_str(&builder.entity_markup(overlay));
        }

        let mut font_faces = String::new();
        let mut families = BTreeSet::new();
        let refs: Vec<&Entity> = self.entities.iter().collect();
        collect_font_families(&refs, &mut families);
        for family in families {
            if let Some(path) = self.config.font_paths.get(&family) {
                let _ = writeln!(
                    font_faces,
                    "@font-face {{font-family: '{family}'; src: url('{path}');}}",
                );
            }
        }

        let viewbox = options.viewbox.unwrap_or_else(|| {
            if self.viewport_transform == Affine::IDENTITY {
                Rect::new(0.0, 0.0, self.width, self.height)
            } else {
                self.calc_viewport_boundaries()
            }
        });
        let width = options.width.unwrap_or(self.width);
        let height = options.height.unwrap_or(self.height);

        let mut svg = String::new();
        if !options.suppress_preamble {
            svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");
        }
        let _ = writeln!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" version=\"1.1\" width=\"{width}\" height=\"{height}\" viewBox=\"{} {} {} {}\">",
            self.config.round(viewbox.x0),
            self.config.round(viewbox.y0),
            self.config.round(viewbox.width()),
            self.config.round(viewbox.height()),
        );
        svg.push_str("<defs>");
        if !font_faces.is_empty() {
            let _ = write!(svg, "<style type=\"text/css\">{font_faces}</style>");
        }
        svg.push_str(&builder.defs);
        svg.push_str("</defs>");
        svg.push_str(&body);
        svg.push_str("</svg>");
        svg
    }

    /// Render the scene into a standalone pixmap.
    ///
    /// The canvas viewport and dimensions are scaled by the multiplier for
    /// the duration of the render and restored afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] for an unusable output size, or
    /// any render pass failure.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_canvas_element(&mut self, options: &RasterOptions) -> RenderResult<Pixmap> {
        let multiplier = options.multiplier;
        let out_w = (self.width * multiplier).round().max(1.0) as u32;
        let out_h = (self.height * multiplier).round().max(1.0) as u32;
        let mut painter = PixmapPainter::new(out_w, out_h)?;

        let saved_vpt = self.viewport_transform;
        let saved_dims = (self.width, self.height);
        let saved_retina = self.config.enable_retina_scaling;
        self.viewport_transform = Affine::scale(multiplier) * saved_vpt;
        self.width *= multiplier;
        self.height *= multiplier;
        self.config.enable_retina_scaling = false;

        let result = self.render_all(&mut painter);

        self.viewport_transform = saved_vpt;
        self.width = saved_dims.0;
        self.height = saved_dims.1;
        self.config.enable_retina_scaling = saved_retina;
        result?;
        Ok(painter.into_pixmap())
    }

    /// Export the scene as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Export`] when encoding fails, or any render
    /// failure.
    pub fn to_png(&mut self, options: &RasterOptions) -> RenderResult<Vec<u8>> {
        let pixmap = self.to_canvas_element(options)?;
        pixmap
            .encode_png()
            .map_err(|e| RenderError::Export(format!("PNG encoding failed: {e}")))
    }

    /// Export the scene as a PNG data URL.
    ///
    /// # Errors
    ///
    /// Propagates render and encoding failures.
    pub fn to_data_url(&mut self, options: &RasterOptions) -> RenderResult<String> {
        let png = self.to_png(options)?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
    }

    /// Export the scene as JPEG bytes, compositing on white.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Export`] when encoding fails, or any render
    /// failure.
    pub fn to_jpeg(&mut self, options: &RasterOptions) -> RenderResult<Vec<u8>> {
        let pixmap = self.to_canvas_element(options)?;
        let (width, height) = (pixmap.width(), pixmap.height());
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for pixel in pixmap.pixels() {
            let color = pixel.demultiply();
            let alpha = f32::from(color.alpha()) / 255.0;
            for channel in [color.red(), color.green(), color.blue()] {
                let value = f32::from(channel) * alpha + 255.0 * (1.0 - alpha);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                rgb.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, options.jpeg_quality);
        encoder
            .write_image(&rgb, width, height, image::ExtendedColorType::Rgb8)
            .map_err(|e| RenderError::Export(format!("JPEG encoding failed: {e}")))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::entity::Prop;
    use easel_core::gradient::{ColorStop, Gradient, GradientCoords};
    use easel_core::shapes;

    fn canvas() -> StaticCanvas {
        let mut canvas = StaticCanvas::new(100.0, 100.0, RenderConfig::default());
        canvas.render_on_add_remove = false;
        canvas
    }

    #[test]
    fn test_svg_header_and_viewbox() {
        let canvas = canvas();
        let svg = canvas.to_svg(&SvgOptions::default(), None);
        assert!(svg.starts_with("<?xml version=\"1.0\""));
        assert!(svg.contains("viewBox=\"0 0 100 100\""));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_suppress_preamble() {
        let canvas = canvas();
        let options = SvgOptions {
            suppress_preamble: true,
            ..SvgOptions::default()
        };
        assert!(canvas.to_svg(&options, None).starts_with("<svg "));
    }

    #[test]
    fn test_rect_markup_and_transform() {
        let mut canvas = canvas();
        let mut rect = shapes::rect(10.0, 20.0, 40.0, 30.0);
        rect.set(Prop::Fill(Paint::color("red")), &RenderConfig::default());
        canvas.add(rect);
        let svg = canvas.to_svg(&SvgOptions::default(), None);
        assert!(svg.contains("<rect x=\"-20\" y=\"-15\" width=\"40\" height=\"30\""));
        assert!(svg.contains("fill=\"red\""));
        assert!(svg.contains("matrix(1 0 0 1 30 35)"));
    }

    #[test]
    fn test_gradient_fill_emits_def_and_reference() {
        let mut canvas = canvas();
        let gradient = Gradient::linear(
            GradientCoords {
                x2: 40.0,
                ..Default::default()
            },
            vec![
                ColorStop {
                    offset: 0.0,
                    color: "red".to_string(),
                    opacity: None,
                },
                ColorStop {
                    offset: 1.0,
                    color: "blue".to_string(),
                    opacity: None,
                },
            ],
        );
        let id = gradient.id.clone();
        let mut rect = shapes::rect(0.0, 0.0, 40.0, 40.0);
        rect.set(
            Prop::Fill(Paint::Gradient(gradient)),
            &RenderConfig::default(),
        );
        canvas.add(rect);
        let svg = canvas.to_svg(&SvgOptions::default(), None);
        assert!(svg.contains(&format!("<linearGradient id=\"{id}\"")));
        assert!(svg.contains(&format!("fill=\"url(#{id})\"")));
    }

    #[test]
    fn test_scene_clip_wraps_entities_in_group() {
        let mut canvas = canvas();
        canvas.add(shapes::rect(0.0, 0.0, 10.0, 10.0));
        canvas.clip_path = Some(easel_core::ClipPath {
            entity: Box::new(shapes::ellipse(0.0, 0.0, 50.0, 50.0)),
            inverted: false,
            absolute_positioned: false,
        });
        let svg = canvas.to_svg(&SvgOptions::default(), None);
        assert!(svg.contains("<g clip-path=\"url(#"));
        assert!(svg.contains("<clipPath id=\""));
    }

    #[test]
    fn test_excluded_entity_not_exported() {
        let mut canvas = canvas();
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        rect.exclude_from_export = true;
        canvas.add(rect);
        let svg = canvas.to_svg(&SvgOptions::default(), None);
        assert!(!svg.contains("<rect x=\"-5\""));
    }

    #[test]
    fn test_font_face_block_from_config() {
        let mut config = RenderConfig::default();
        config.font_paths.insert(
            "Inter".to_string(),
            "fonts/inter.woff2".to_string(),
        );
        let mut canvas = StaticCanvas::new(100.0, 100.0, config);
        canvas.render_on_add_remove = false;
        let mut label = shapes::text("hi", 0.0, 0.0);
        if let EntityKind::Text { font_family, .. } = &mut label.kind {
            *font_family = "Inter".to_string();
        }
        canvas.add(label);
        let svg = canvas.to_svg(&SvgOptions::default(), None);
        assert!(svg.contains("@font-face {font-family: 'Inter'"));
        assert!(svg.contains("url('fonts/inter.woff2')"));
    }

    #[test]
    fn test_svg_reviver_rewrites_fragments() {
        let mut canvas = canvas();
        canvas.add(shapes::rect(0.0, 0.0, 10.0, 10.0));
        let reviver = |_: &Entity, fragment: String| format!("<!--entity-->{fragment}");
        let svg = canvas.to_svg(&SvgOptions::default(), Some(&reviver));
        assert!(svg.contains("<!--entity--><rect"));
    }

    #[test]
    fn test_to_canvas_element_scales_and_restores() {
        let mut canvas = canvas();
        let mut rect = shapes::rect(0.0, 0.0, 100.0, 100.0);
        rect.set(Prop::Fill(Paint::color("red")), &RenderConfig::default());
        canvas.add(rect);
        let pixmap = canvas
            .to_canvas_element(&RasterOptions {
                multiplier: 2.0,
                ..RasterOptions::default()
            })
            .expect("render");
        assert_eq!((pixmap.width(), pixmap.height()), (200, 200));
        let pixel = pixmap.pixel(150, 150).expect("pixel");
        assert_eq!((pixel.red(), pixel.alpha()), (255, 255));
        assert!((canvas.width() - 100.0).abs() < 1e-9);
        assert_eq!(canvas.viewport_transform(), Affine::IDENTITY);
    }

    #[test]
    fn test_rasterize_entity_matches_bounding_box() {
        let cfg = RenderConfig::default();
        let mut rect = shapes::rect(10.0, 10.0, 40.0, 30.0);
        rect.set(Prop::Fill(Paint::color("red")), &cfg);
        rect.stroke_width = 0.0;
        let pixmap = rasterize_entity(
            &mut rect,
            &cfg,
            &RasterOptions {
                multiplier: 2.0,
                ..RasterOptions::default()
            },
        )
        .expect("rasterize");
        assert_eq!((pixmap.width(), pixmap.height()), (80, 60));
        let pixel = pixmap.pixel(40, 30).expect("pixel");
        assert_eq!((pixel.red(), pixel.alpha()), (255, 255));
    }

    #[test]
    fn test_data_url_is_png() {
        let mut canvas = canvas();
        canvas.add(shapes::rect(0.0, 0.0, 10.0, 10.0));
        let url = canvas
            .to_data_url(&RasterOptions::default())
            .expect("export");
        assert!(url.starts_with("data:image/png;base64,"));
        let payload = STANDARD
            .decode(&url["data:image/png;base64,".len()..])
            .expect("base64");
        assert_eq!(&payload[1..4], b"PNG");
    }

    #[test]
    fn test_jpeg_export_produces_jfif_bytes() {
        let mut canvas = canvas();
        canvas.background_color = Paint::color("#336699");
        let jpeg = canvas
            .to_jpeg(&RasterOptions::default())
            .expect("export");
        assert_eq!(&jpeg[0..3], &[0xFF, 0xD8, 0xFF]);
    }
}
