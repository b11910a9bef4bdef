use signpost::error::AppError;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    signpost::runner::run().await
}
