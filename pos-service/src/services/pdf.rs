use printpdf::{
    path::{PaintMode, WindingOrder},
    BuiltinFont, Color, ColorBits, ColorSpace, Image, ImageTransform, ImageXObject, Mm,
    PdfDocument, Point, Polygon, Px, Rgb,
};
use service_core::error::AppError;

use crate::services::receipts::ReceiptData;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
/// Physical QR size on the page.
const QR_SIZE_MM: f32 = 35.0;

/// Rendering preset. Trades raster density and background graphics for file
/// size; orthogonal to the payment flow, which renders with the configured
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfQuality {
    High,
    Medium,
    Low,
}

impl PdfQuality {
    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "medium" => PdfQuality::Medium,
            "low" => PdfQuality::Low,
            _ => PdfQuality::High,
        }
    }

    /// Pixels per QR module in the rasterized code.
    pub fn qr_module_px(&self) -> usize {
        match self {
            PdfQuality::High => 8,
            PdfQuality::Medium => 6,
            PdfQuality::Low => 4,
        }
    }

    fn draw_header_band(&self) -> bool {
        !matches!(self, PdfQuality::Low)
    }
}

/// Greyscale raster of a QR code: `width * width` bytes, 0 = black.
pub struct QrRaster {
    pub width: usize,
    pub pixels: Vec<u8>,
}

/// Receipt PDF renderer: A4, builtin Helvetica, no page or size limits --
/// long item lists simply extend onto further pages.
#[derive(Clone)]
pub struct PdfRenderer {
    quality: PdfQuality,
}

impl PdfRenderer {
    pub fn new(quality: PdfQuality) -> Self {
        Self { quality }
    }

    pub fn quality(&self) -> PdfQuality {
        self.quality
    }

    pub fn render(&self, data: &ReceiptData, qr: &QrRaster) -> Result<Vec<u8>, AppError> {
        let (doc, page1, layer1) = PdfDocument::new(
            format!("Recibo {}", data.receipt_number),
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "Layer 1",
        );

        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to add font: {}", e)))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to add font: {}", e)))?;

        let mut layer = doc.get_page(page1).get_layer(layer1);

        // Company header
        if self.quality.draw_header_band() {
            layer.set_fill_color(Color::Rgb(Rgb::new(0.92, 0.92, 0.92, None)));
            let band = Polygon {
                rings: vec![vec![
                    (Point::new(Mm(0.0), Mm(268.0)), false),
                    (Point::new(Mm(PAGE_WIDTH_MM), Mm(268.0)), false),
                    (Point::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM)), false),
                    (Point::new(Mm(0.0), Mm(PAGE_HEIGHT_MM)), false),
                ]],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            };
            layer.add_polygon(band);
            layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        }

        layer.use_text(&data.company.name, 16.0, Mm(MARGIN_MM), Mm(284.0), &bold);
        if !data.company.document.is_empty() {
            layer.use_text(
                format!("CNPJ: {}", data.company.document),
                9.0,
                Mm(MARGIN_MM),
                Mm(277.0),
                &font,
            );
        }
        if !data.company.address.is_empty() {
            layer.use_text(&data.company.address, 9.0, Mm(MARGIN_MM), Mm(272.0), &font);
        }

        layer.use_text("RECIBO DE PAGAMENTO", 13.0, Mm(MARGIN_MM), Mm(260.0), &bold);
        layer.use_text(
            format!("Recibo Nº {}", data.receipt_number),
            10.0,
            Mm(MARGIN_MM),
            Mm(253.0),
            &font,
        );
        layer.use_text(
            format!(
                "Emitido em {}",
                data.payment.created_at.format("%d/%m/%Y %H:%M UTC")
            ),
            10.0,
            Mm(MARGIN_MM),
            Mm(248.0),
            &font,
        );
        if let Some(ref customer) = data.customer_name {
            layer.use_text(
                format!("Cliente: {}", customer),
                10.0,
                Mm(MARGIN_MM),
                Mm(243.0),
                &font,
            );
        }

        // Items table
        let mut y = 234.0;
        layer.use_text("Item", 10.0, Mm(MARGIN_MM), Mm(y), &bold);
        layer.use_text("Qtd", 10.0, Mm(118.0), Mm(y), &bold);
        layer.use_text("Unit.", 10.0, Mm(136.0), Mm(y), &bold);
        layer.use_text("Desc.", 10.0, Mm(156.0), Mm(y), &bold);
        layer.use_text("Total", 10.0, Mm(178.0), Mm(y), &bold);
        y -= 7.0;

        for item in &data.sale.items {
            if y < 40.0 {
                let (page, layer_idx) =
                    doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
                layer = doc.get_page(page).get_layer(layer_idx);
                y = 280.0;
            }
            layer.use_text(truncate(&item.product_name, 48), 10.0, Mm(MARGIN_MM), Mm(y), &font);
            layer.use_text(item.quantity.to_string(), 10.0, Mm(118.0), Mm(y), &font);
            layer.use_text(format!("{:.2}", item.unit_price), 10.0, Mm(136.0), Mm(y), &font);
            layer.use_text(format!("{:.2}", item.discount), 10.0, Mm(156.0), Mm(y), &font);
            layer.use_text(format!("{:.2}", item.total), 10.0, Mm(178.0), Mm(y), &font);
            y -= 6.0;
        }

        // Totals and payment details need room; break if the items ran long.
        if y < 95.0 {
            let (page, layer_idx) = doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            layer = doc.get_page(page).get_layer(layer_idx);
            y = 280.0;
        }

        y -= 4.0;
        layer.use_text("Subtotal", 10.0, Mm(136.0), Mm(y), &font);
        layer.use_text(format!("R$ {:.2}", data.sale.subtotal), 10.0, Mm(170.0), Mm(y), &font);
        y -= 6.0;
        layer.use_text("Desconto", 10.0, Mm(136.0), Mm(y), &font);
        layer.use_text(format!("R$ {:.2}", data.sale.discount), 10.0, Mm(170.0), Mm(y), &font);
        y -= 6.0;
        layer.use_text("Impostos", 10.0, Mm(136.0), Mm(y), &font);
        layer.use_text(format!("R$ {:.2}", data.sale.tax), 10.0, Mm(170.0), Mm(y), &font);
        y -= 7.0;
        layer.use_text("Total", 11.0, Mm(136.0), Mm(y), &bold);
        layer.use_text(format!("R$ {:.2}", data.sale.total), 11.0, Mm(170.0), Mm(y), &bold);

        y -= 12.0;
        layer.use_text("Pagamento", 11.0, Mm(MARGIN_MM), Mm(y), &bold);
        y -= 6.0;
        layer.use_text(
            format!("Forma: {}", data.payment.method.label()),
            10.0,
            Mm(MARGIN_MM),
            Mm(y),
            &font,
        );
        y -= 6.0;
        layer.use_text(
            format!("Valor pago: R$ {:.2}", data.payment.amount),
            10.0,
            Mm(MARGIN_MM),
            Mm(y),
            &font,
        );
        if let Some(ref reference) = data.payment.reference {
            y -= 6.0;
            layer.use_text(format!("Referência: {}", reference), 10.0, Mm(MARGIN_MM), Mm(y), &font);
        }
        if let Some(ref processed_by) = data.payment.processed_by {
            y -= 6.0;
            layer.use_text(format!("Operador: {}", processed_by), 10.0, Mm(MARGIN_MM), Mm(y), &font);
        }

        // QR code, bottom right
        let qr_image = Image::from(ImageXObject {
            width: Px(qr.width),
            height: Px(qr.width),
            color_space: ColorSpace::Greyscale,
            bits_per_component: ColorBits::Bit8,
            interpolate: false,
            image_data: qr.pixels.clone(),
            image_filter: None,
            smask: None,
            clipping_bbox: None,
        });
        let dpi = qr.width as f32 / QR_SIZE_MM * 25.4;
        qr_image.add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(PAGE_WIDTH_MM - MARGIN_MM - QR_SIZE_MM)),
                translate_y: Some(Mm(24.0)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );

        // Verification footer
        layer.use_text(
            "Verifique a autenticidade deste recibo em:",
            8.0,
            Mm(MARGIN_MM),
            Mm(18.0),
            &font,
        );
        layer.use_text(&data.verification_url, 8.0, Mm(MARGIN_MM), Mm(14.0), &font);

        doc.save_to_bytes()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to save PDF: {}", e)))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
