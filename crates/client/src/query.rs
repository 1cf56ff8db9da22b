//! Queries: build a request, fetch it, parse the response.

use std::marker::PhantomData;

use async_trait::async_trait;
use reqcache_core::{Error, Request, Response};
use serde::de::DeserializeOwned;

use crate::fetch::HttpFetcher;
use crate::options::RequestOptions;

/// A request builder, fetcher and parser that can be wrapped by a
/// [`RequestCache`](crate::RequestCache).
///
/// The cache calls the three parts separately so it can store the fetched
/// response before parsing it; [`Query::call`] composes them for uncached use.
#[async_trait]
pub trait Query: Send + Sync + 'static {
    type Params: Send + Sync + 'static;
    type Output: Send + 'static;

    /// Build the request for `params`. Equal params must build equal requests.
    fn create_request(&self, params: &Self::Params, options: &RequestOptions) -> Result<Request, Error>;

    async fn fetch(&self, request: &Request, options: &RequestOptions) -> Result<Response, Error>;

    /// Turn a response into a value. Corrupt or unexpected payloads must fail
    /// with an error so the cache can drop the entry.
    async fn parse_response(&self, response: Response) -> Result<Self::Output, Error>;

    async fn call(&self, params: &Self::Params, options: &RequestOptions) -> Result<Self::Output, Error> {
        let request = self.create_request(params, options)?;
        let response = self.fetch(&request, options).await?;
        self.parse_response(response).await
    }
}

type BuildRequest<P> = dyn Fn(&P) -> Result<Request, Error> + Send + Sync;

/// A query fetching over HTTP and deserializing a JSON body into `T`.
pub struct JsonQuery<P, T> {
    fetcher: HttpFetcher,
    build: Box<BuildRequest<P>>,
    _output: PhantomData<fn() -> T>,
}

impl<P, T> JsonQuery<P, T> {
    pub fn new(fetcher: HttpFetcher, build: impl Fn(&P) -> Result<Request, Error> + Send + Sync + 'static) -> Self {
        Self { fetcher, build: Box::new(build), _output: PhantomData }
    }
}

#[async_trait]
impl<P, T> Query for JsonQuery<P, T>
where
    P: Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
{
    type Params = P;
    type Output = T;

    fn create_request(&self, params: &P, options: &RequestOptions) -> Result<Request, Error> {
        let mut request = (self.build)(params)?;
        request.headers.extend(options.headers.iter().cloned());
        if !request.headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("accept")) {
            request.headers.push(("Accept".into(), "application/json".into()));
        }
        Ok(request)
    }

    async fn fetch(&self, request: &Request, options: &RequestOptions) -> Result<Response, Error> {
        self.fetcher.fetch(request, options.signal.as_ref()).await
    }

    async fn parse_response(&self, response: Response) -> Result<T, Error> {
        if !response.is_success() {
            return Err(Error::HttpStatus(response.status));
        }
        response.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchConfig, canonical_request};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Forecast {
        city: String,
        temp: i32,
    }

    fn forecast_query() -> JsonQuery<String, Forecast> {
        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        JsonQuery::new(fetcher, |city: &String| {
            canonical_request("GET", &format!("https://weather.example/forecast?city={city}"))
        })
    }

    #[test]
    fn test_create_request_adds_headers() {
        let query = forecast_query();
        let options = RequestOptions::new().with_header("X-Trace", "abc");

        let request = query.create_request(&"Paris".to_string(), &options).unwrap();
        assert_eq!(request.url.query(), Some("city=Paris"));
        assert!(request.headers.contains(&("X-Trace".into(), "abc".into())));
        assert!(request.headers.contains(&("Accept".into(), "application/json".into())));
    }

    #[test]
    fn test_create_request_keeps_explicit_accept() {
        let query = forecast_query();
        let options = RequestOptions::new().with_header("accept", "application/geo+json");

        let request = query.create_request(&"Oslo".to_string(), &options).unwrap();
        let accepts: Vec<_> = request.headers.iter().filter(|(n, _)| n.eq_ignore_ascii_case("accept")).collect();
        assert_eq!(accepts.len(), 1);
    }

    #[test]
    fn test_request_key_ignores_headers() {
        let query = forecast_query();
        let plain = query.create_request(&"Paris".to_string(), &RequestOptions::new()).unwrap();
        let traced =
            query.create_request(&"Paris".to_string(), &RequestOptions::new().with_header("X-Trace", "1")).unwrap();
        assert_eq!(plain.key(), traced.key());
    }

    #[tokio::test]
    async fn test_parse_response_json() {
        let query = forecast_query();
        let forecast = query.parse_response(Response::new(r#"{"city":"Paris","temp":21}"#)).await.unwrap();
        assert_eq!(forecast, Forecast { city: "Paris".into(), temp: 21 });
    }

    #[tokio::test]
    async fn test_parse_response_corrupt_body() {
        let query = forecast_query();
        let result = query.parse_response(Response::new("{\"city\":")).await;
        assert!(result.unwrap_err().is_parse());
    }

    #[tokio::test]
    async fn test_parse_response_error_status() {
        let query = forecast_query();
        let response = Response::new(r#"{"city":"Paris","temp":21}"#).with_status(503);
        assert!(matches!(query.parse_response(response).await, Err(Error::HttpStatus(503))));
    }
}
