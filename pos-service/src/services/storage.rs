use service_core::error::AppError;
use std::path::PathBuf;
use tokio::fs;

/// Receipt PDFs on local disk, one file per receipt: `{receiptNumber}.pdf`
/// under the configured directory.
#[derive(Clone)]
pub struct ReceiptStorage {
    base_path: PathBuf,
}

impl ReceiptStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }

    fn path_for(&self, receipt_number: &str) -> PathBuf {
        self.base_path.join(format!("{}.pdf", receipt_number))
    }

    /// Relative path recorded on `ReceiptHistory.file_path`.
    pub fn relative_path(&self, receipt_number: &str) -> String {
        self.path_for(receipt_number).to_string_lossy().into_owned()
    }

    pub async fn save(&self, receipt_number: &str, data: &[u8]) -> Result<(), AppError> {
        fs::write(self.path_for(receipt_number), data).await?;
        Ok(())
    }

    /// `None` when the cached file is gone; callers regenerate in that case.
    pub async fn load(&self, receipt_number: &str) -> Result<Option<Vec<u8>>, AppError> {
        match fs::read(self.path_for(receipt_number)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, receipt_number: &str) -> Result<(), AppError> {
        let path = self.path_for(receipt_number);
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }
}
