mod http_roundtrip;
mod navigation;
mod stop_sequence;
