mod resumable_stream_case1;
