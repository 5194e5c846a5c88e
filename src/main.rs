use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use realtime_metrics::{handle, CloudFrontProvider, CustomResourceRequest, HttpResponseSender};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // cloudwatch timestamps every line already
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("realtime_metrics=info".parse()?))
        .with_ansi(false)
        .without_time()
        .init();

    let provider = CloudFrontProvider::from_env().await;
    let sender = HttpResponseSender::default();
    let provider = &provider;
    let sender = &sender;

    let func = service_fn(move |event: LambdaEvent<CustomResourceRequest>| async move {
        let (request, context) = event.into_parts();
        handle(request, &context.env_config.log_stream, provider, sender).await
    });
    run(func).await?;
    Ok(())
}
